//! Test fixtures shared by the unit tests of this crate.

use std::sync::{Arc, Mutex};

use contracts::{
    Dispatchable, FixedFramePoseData, ImuData, LandmarkData, OdometryData, SensorData, SensorId,
    Time, TimedPointCloudData, TrajectoryBuilder,
};
use nalgebra::Vector3;

use crate::CollatedSensorDataHandler;

pub(crate) fn imu(sensor_id: &str, seconds: f64) -> Box<dyn SensorData> {
    Dispatchable::boxed(
        sensor_id,
        ImuData {
            time: Time::from_seconds(seconds),
            linear_acceleration: Vector3::new(0.0, 0.0, 9.81),
            angular_velocity: Vector3::zeros(),
        },
    )
}

/// Delivery log: (trajectory id, sensor id, time in seconds)
#[derive(Clone, Default)]
pub(crate) struct Recorder {
    delivered: Arc<Mutex<Vec<(i32, String, f64)>>>,
}

impl Recorder {
    pub(crate) fn handler(&self, trajectory_id: i32) -> Arc<dyn CollatedSensorDataHandler> {
        let delivered = Arc::clone(&self.delivered);
        Arc::new(move |sensor_id: &SensorId, data: Box<dyn SensorData>| {
            delivered.lock().unwrap().push((
                trajectory_id,
                sensor_id.to_string(),
                data.time().as_seconds(),
            ));
        })
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.delivered.lock().unwrap().is_empty()
    }

    pub(crate) fn times(&self, trajectory_id: i32) -> Vec<f64> {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _, _)| *id == trajectory_id)
            .map(|(_, _, time)| *time)
            .collect()
    }

    pub(crate) fn sensors(&self, trajectory_id: i32) -> Vec<String> {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _, _)| *id == trajectory_id)
            .map(|(_, sensor, _)| sensor.clone())
            .collect()
    }
}

/// `TrajectoryBuilder` that logs "<sensor>@<seconds>" per delivered sample
#[derive(Clone, Default)]
pub(crate) struct RecordingBuilder {
    pub(crate) received: Arc<Mutex<Vec<String>>>,
}

impl RecordingBuilder {
    fn push(&self, sensor_id: &SensorId, time: Time) {
        self.received
            .lock()
            .unwrap()
            .push(format!("{sensor_id}@{}", time.as_seconds()));
    }

    pub(crate) fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }
}

impl TrajectoryBuilder for RecordingBuilder {
    fn add_rangefinder_data(&mut self, sensor_id: &SensorId, data: TimedPointCloudData) {
        self.push(sensor_id, data.time);
    }

    fn add_imu_data(&mut self, sensor_id: &SensorId, data: ImuData) {
        self.push(sensor_id, data.time);
    }

    fn add_odometry_data(&mut self, sensor_id: &SensorId, data: OdometryData) {
        self.push(sensor_id, data.time);
    }

    fn add_fixed_frame_pose_data(&mut self, sensor_id: &SensorId, data: FixedFramePoseData) {
        self.push(sensor_id, data.time);
    }

    fn add_landmark_data(&mut self, sensor_id: &SensorId, data: LandmarkData) {
        self.push(sensor_id, data.time);
    }
}
