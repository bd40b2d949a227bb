//! SensorData - the sample unit travelling through the collator.
//!
//! A sample knows its timestamp, its sensor, and how to hand itself to a
//! [`TrajectoryBuilder`]. The collator only ever uses the first two; the third
//! is a double dispatch so that downstream consumers receive concrete payload
//! types without the collator matching on them.

use std::fmt;

use crate::{
    FixedFramePoseData, ImuData, LandmarkData, OdometryData, SensorId, Time, TimedPointCloudData,
};

/// Downstream consumer of ordered samples for one trajectory.
///
/// Implemented by local SLAM / pose estimation front ends. Methods are called
/// in non-decreasing sample time order when fed through the collator.
pub trait TrajectoryBuilder: Send {
    fn add_rangefinder_data(&mut self, sensor_id: &SensorId, data: TimedPointCloudData);

    fn add_imu_data(&mut self, sensor_id: &SensorId, data: ImuData);

    fn add_odometry_data(&mut self, sensor_id: &SensorId, data: OdometryData);

    fn add_fixed_frame_pose_data(&mut self, sensor_id: &SensorId, data: FixedFramePoseData);

    fn add_landmark_data(&mut self, sensor_id: &SensorId, data: LandmarkData);
}

/// Timestamped sample accepted by the collator
pub trait SensorData: Send {
    fn time(&self) -> Time;

    fn sensor_id(&self) -> &SensorId;

    /// Consumes the sample and applies it to `builder`.
    fn add_to_trajectory_builder(self: Box<Self>, builder: &mut dyn TrajectoryBuilder);
}

impl fmt::Debug for dyn SensorData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SensorData")
            .field("sensor_id", self.sensor_id())
            .field("time", &self.time())
            .finish()
    }
}

/// Payload type that maps onto one [`TrajectoryBuilder`] method
pub trait Payload: Send + 'static {
    fn time(&self) -> Time;

    fn add_to(self, sensor_id: &SensorId, builder: &mut dyn TrajectoryBuilder);
}

macro_rules! impl_payload {
    ($ty:ty, $method:ident) => {
        impl Payload for $ty {
            #[inline]
            fn time(&self) -> Time {
                self.time
            }

            #[inline]
            fn add_to(self, sensor_id: &SensorId, builder: &mut dyn TrajectoryBuilder) {
                builder.$method(sensor_id, self);
            }
        }
    };
}

impl_payload!(TimedPointCloudData, add_rangefinder_data);
impl_payload!(ImuData, add_imu_data);
impl_payload!(OdometryData, add_odometry_data);
impl_payload!(FixedFramePoseData, add_fixed_frame_pose_data);
impl_payload!(LandmarkData, add_landmark_data);

/// Generic [`SensorData`] wrapping a single payload
#[derive(Debug, Clone)]
pub struct Dispatchable<P> {
    sensor_id: SensorId,
    payload: P,
}

impl<P: Payload> Dispatchable<P> {
    pub fn new(sensor_id: impl Into<SensorId>, payload: P) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            payload,
        }
    }

    /// Shorthand for the boxed form the collator takes.
    pub fn boxed(sensor_id: impl Into<SensorId>, payload: P) -> Box<dyn SensorData> {
        Box::new(Self::new(sensor_id, payload))
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }
}

impl<P: Payload> SensorData for Dispatchable<P> {
    #[inline]
    fn time(&self) -> Time {
        self.payload.time()
    }

    #[inline]
    fn sensor_id(&self) -> &SensorId {
        &self.sensor_id
    }

    fn add_to_trajectory_builder(self: Box<Self>, builder: &mut dyn TrajectoryBuilder) {
        let Dispatchable { sensor_id, payload } = *self;
        payload.add_to(&sensor_id, builder);
    }
}
