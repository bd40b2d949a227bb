//! # Contracts
//!
//! Frozen interface contracts shared by every collation crate.
//! Business crates depend on this crate only; reverse dependencies are prohibited.
//!
//! ## Time Model
//! - Sample timestamps are [`Time`]: 100 ns ticks on the universal time scale
//! - Wall-clock time is only used for diagnostics (rate logging)

mod blueprint;
mod error;
mod queue_key;
mod sensor;
mod sensor_data;
mod sensor_id;
mod time;

pub use blueprint::*;
pub use error::*;
pub use queue_key::QueueKey;
pub use sensor::*;
pub use sensor_data::*;
pub use sensor_id::SensorId;
pub use time::Time;
