//! Sensor payloads and expected-sensor descriptors.
//!
//! The collator never looks inside a payload; these types only exist so that
//! a sample can hand itself to the right [`TrajectoryBuilder`](crate::TrajectoryBuilder)
//! method.

use nalgebra::{Isometry3, Vector3};
use serde::{Deserialize, Serialize};

use crate::{SensorId, Time};

/// Kind of sensor stream feeding a trajectory
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorType {
    /// Range scans (2D/3D lidar, depth)
    Range,
    Imu,
    Odometry,
    /// Poses of the tracking frame in a fixed frame (e.g. GNSS)
    FixedFramePose,
    Landmark,
    LocalSlamResult,
}

/// One sensor a trajectory expects data from
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ExpectedSensorId {
    #[serde(rename = "type")]
    pub sensor_type: SensorType,
    pub id: SensorId,
}

impl ExpectedSensorId {
    pub fn new(sensor_type: SensorType, id: impl Into<SensorId>) -> Self {
        Self {
            sensor_type,
            id: id.into(),
        }
    }
}

/// Single rangefinder return, relative to the scan timestamp
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangefinderPoint {
    pub position: Vector3<f32>,
    /// Seconds relative to the scan time (non-positive for a scan ending at its timestamp)
    pub time: f32,
}

/// Range scan
#[derive(Debug, Clone, PartialEq)]
pub struct TimedPointCloudData {
    pub time: Time,
    pub origin: Vector3<f32>,
    pub ranges: Vec<RangefinderPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImuData {
    pub time: Time,
    /// m/s²
    pub linear_acceleration: Vector3<f64>,
    /// rad/s
    pub angular_velocity: Vector3<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OdometryData {
    pub time: Time,
    pub pose: Isometry3<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedFramePoseData {
    pub time: Time,
    /// `None` when the fix was lost
    pub pose: Option<Isometry3<f64>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkObservation {
    pub id: String,
    pub landmark_to_tracking_transform: Isometry3<f64>,
    pub translation_weight: f64,
    pub rotation_weight: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkData {
    pub time: Time,
    pub observations: Vec<LandmarkObservation>,
}
