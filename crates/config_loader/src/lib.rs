//! # Config Loader
//!
//! Loads the collation configuration.
//!
//! - Parse TOML/JSON files
//! - Validate trajectory and sensor declarations
//! - Produce a `CollationBlueprint`
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let blueprint = ConfigLoader::load_from_path(Path::new("collation.toml")).unwrap();
//! println!("trajectories: {}", blueprint.trajectories.len());
//! ```

mod parser;
mod validator;

pub use contracts::CollationBlueprint;
pub use parser::ConfigFormat;

use contracts::ContractError;
use std::path::Path;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a file, picking the format from its extension
    /// (`.toml` / `.json`).
    ///
    /// # Errors
    /// - Unsupported or missing extension
    /// - File read failure
    /// - Parse or validation failure
    pub fn load_from_path(path: &Path) -> Result<CollationBlueprint, ContractError> {
        let format = Self::detect_format(path)?;
        let content = std::fs::read_to_string(path)?;
        let blueprint = Self::load_from_str(&content, format)?;
        tracing::debug!(
            path = %path.display(),
            trajectories = blueprint.trajectories.len(),
            "collation config loaded"
        );
        Ok(blueprint)
    }

    /// # Errors
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_str(
        content: &str,
        format: ConfigFormat,
    ) -> Result<CollationBlueprint, ContractError> {
        let blueprint = parser::parse(content, format)?;
        validator::validate(&blueprint)?;
        Ok(blueprint)
    }

    pub fn to_toml(blueprint: &CollationBlueprint) -> Result<String, ContractError> {
        toml::to_string_pretty(blueprint)
            .map_err(|e| ContractError::config_parse(format!("TOML serialize error: {e}")))
    }

    pub fn to_json(blueprint: &CollationBlueprint) -> Result<String, ContractError> {
        serde_json::to_string_pretty(blueprint)
            .map_err(|e| ContractError::config_parse(format!("JSON serialize error: {e}")))
    }

    fn detect_format(path: &Path) -> Result<ConfigFormat, ContractError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            ContractError::config_parse("cannot determine file format from extension")
        })?;

        ConfigFormat::from_extension(ext).ok_or_else(|| {
            ContractError::config_parse(format!("unsupported config format: .{ext}"))
        })
    }
}
