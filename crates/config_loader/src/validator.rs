//! 配置校验模块
//!
//! 校验规则：
//! - trajectory_id 唯一
//! - 传感器 id 非空，且在同一轨迹内唯一
//! - rate_logging_period_s > 0
//! - log_level 非空，metrics_port 非零

use std::collections::HashSet;

use contracts::{CollationBlueprint, ContractError};

/// 校验 CollationBlueprint 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(blueprint: &CollationBlueprint) -> Result<(), ContractError> {
    validate_collator(blueprint)?;
    validate_observability(blueprint)?;
    validate_trajectory_ids(blueprint)?;
    validate_sensor_ids(blueprint)?;
    Ok(())
}

fn validate_collator(blueprint: &CollationBlueprint) -> Result<(), ContractError> {
    let period = blueprint.collator.rate_logging_period_s;
    if !(period.is_finite() && period > 0.0) {
        return Err(ContractError::config_validation(
            "collator.rate_logging_period_s",
            format!("rate_logging_period_s must be > 0, got {period}"),
        ));
    }
    Ok(())
}

fn validate_observability(blueprint: &CollationBlueprint) -> Result<(), ContractError> {
    let options = &blueprint.observability;
    if options.log_level.trim().is_empty() {
        return Err(ContractError::config_validation(
            "observability.log_level",
            "log_level must not be empty",
        ));
    }
    if options.metrics_port == Some(0) {
        return Err(ContractError::config_validation(
            "observability.metrics_port",
            "metrics_port must be a fixed, non-zero port",
        ));
    }
    Ok(())
}

fn validate_trajectory_ids(blueprint: &CollationBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for trajectory in &blueprint.trajectories {
        if !seen.insert(trajectory.trajectory_id) {
            return Err(ContractError::config_validation(
                format!("trajectories[id={}]", trajectory.trajectory_id),
                "duplicate trajectory_id",
            ));
        }
    }
    Ok(())
}

/// 传感器 id 只需在轨迹内唯一：队列键本身带有 trajectory_id。
fn validate_sensor_ids(blueprint: &CollationBlueprint) -> Result<(), ContractError> {
    for trajectory in &blueprint.trajectories {
        let mut seen = HashSet::new();
        for (index, sensor) in trajectory.sensors.iter().enumerate() {
            if sensor.id.is_empty() {
                return Err(ContractError::config_validation(
                    format!("trajectories[{}].sensors[{index}]", trajectory.trajectory_id),
                    "sensor id must not be empty",
                ));
            }
            if !seen.insert(sensor.id.as_str()) {
                return Err(ContractError::config_validation(
                    format!(
                        "trajectories[{}].sensors[id={}]",
                        trajectory.trajectory_id, sensor.id
                    ),
                    "duplicate sensor id",
                ));
            }
        }
    }
    Ok(())
}
