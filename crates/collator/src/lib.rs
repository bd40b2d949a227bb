//! # Collator
//!
//! Orders asynchronously arriving sensor samples by time before they reach
//! each trajectory's builder.
//!
//! - [`OrderedMultiQueue`]: one FIFO per (trajectory, sensor), released only
//!   when no other queue can still produce an earlier sample
//! - [`Collator`]: a single merge shared by all trajectories
//! - [`TrajectoryCollator`]: an independent merge per trajectory
//! - [`CollatedTrajectoryBuilder`]: per-trajectory adapter with rate logging
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use collator::{CollatedTrajectoryBuilder, Collator};
//!
//! let collator = Arc::new(Collator::new());
//! let builder = CollatedTrajectoryBuilder::new(
//!     &options, collator.clone(), 0, &expected_sensors, Box::new(local_slam),
//! );
//!
//! builder.add_data(scan);
//! builder.add_data(imu);
//! // ...
//! builder.finish();
//! ```

mod clock;
mod collated_trajectory_builder;
mod collator;
mod ordered_multi_queue;
mod rate_timer;
mod trajectory_collator;

#[cfg(test)]
mod testing;

use std::sync::Arc;

pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use crate::collated_trajectory_builder::CollatedTrajectoryBuilder;
pub use crate::collator::{Collator, CollatorInterface};
pub use crate::ordered_multi_queue::{CollatedSensorDataHandler, OrderedMultiQueue};
pub use crate::rate_timer::RateTimer;
pub use crate::trajectory_collator::TrajectoryCollator;

pub use contracts::{CollatorKind, CollatorOptions, QueueKey, SensorData, SensorId, Time};

/// Builds the collator selected by `options`.
pub fn create_collator(options: &CollatorOptions) -> Arc<dyn CollatorInterface> {
    match options.kind {
        CollatorKind::Global => Arc::new(Collator::new()),
        CollatorKind::PerTrajectory => Arc::new(TrajectoryCollator::new()),
    }
}
