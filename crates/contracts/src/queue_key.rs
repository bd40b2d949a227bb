//! QueueKey - names one ordered buffer of the collator.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::SensorId;

/// Identifies the buffer of one sensor stream within one trajectory.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QueueKey {
    pub trajectory_id: i32,
    pub sensor_id: SensorId,
}

impl QueueKey {
    pub fn new(trajectory_id: i32, sensor_id: impl Into<SensorId>) -> Self {
        Self {
            trajectory_id,
            sensor_id: sensor_id.into(),
        }
    }
}

impl fmt::Display for QueueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.trajectory_id, self.sensor_id)
    }
}
