//! Bridges one trajectory to a collator.
//!
//! Registers the trajectory's collated sensors, forwards incoming samples to
//! the collator and hands released samples to the wrapped
//! [`TrajectoryBuilder`], logging per-sensor rates along the way.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use contracts::{
    ExpectedSensorId, SensorData, SensorId, SensorType, Time, TrajectoryBuilder,
    TrajectoryBuilderOptions, DEFAULT_RATE_LOGGING_PERIOD_S,
};
use tracing::{info, instrument};

use crate::clock::{Clock, SystemClock};
use crate::collator::CollatorInterface;
use crate::ordered_multi_queue::CollatedSensorDataHandler;
use crate::rate_timer::RateTimer;

/// Per-sensor rate timers plus the wall time of the last log round.
#[derive(Debug)]
pub(crate) struct SensorRateLog {
    period: Duration,
    timers: BTreeMap<SensorId, RateTimer>,
    last_logging_time: Instant,
}

impl SensorRateLog {
    pub(crate) fn new(period: Duration, now: Instant) -> Self {
        Self {
            period,
            timers: BTreeMap::new(),
            last_logging_time: now,
        }
    }

    /// Pulses `sensor_id`'s timer. Once more than one period has passed since
    /// the last round, returns one `(sensor, summary, rate_hz)` entry per tracked sensor.
    pub(crate) fn pulse(
        &mut self,
        sensor_id: &SensorId,
        time: Time,
        now: Instant,
    ) -> Option<Vec<(SensorId, String, f64)>> {
        let period = self.period;
        self.timers
            .entry(sensor_id.clone())
            .or_insert_with(|| RateTimer::new(period))
            .pulse(time, now);

        if now.saturating_duration_since(self.last_logging_time) <= self.period {
            return None;
        }
        self.last_logging_time = now;
        Some(
            self.timers
                .iter()
                .map(|(id, timer)| (id.clone(), timer.debug_string(), timer.compute_rate()))
                .collect(),
        )
    }
}

struct ForwarderState {
    wrapped: Box<dyn TrajectoryBuilder>,
    rate_log: SensorRateLog,
}

/// Handler registered with the collator on behalf of one trajectory
struct CollatedDataForwarder {
    trajectory_id: i32,
    clock: Arc<dyn Clock>,
    state: Mutex<ForwarderState>,
}

impl CollatedSensorDataHandler for CollatedDataForwarder {
    fn handle_collated_sensor_data(&self, sensor_id: &SensorId, data: Box<dyn SensorData>) {
        let now = self.clock.now();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(lines) = state.rate_log.pulse(sensor_id, data.time(), now) {
            for (id, summary, rate_hz) in lines {
                info!(trajectory_id = self.trajectory_id, sensor_id = %id, "{id} rate: {summary}");
                observability::record_sensor_rate(&id, rate_hz);
            }
        }

        data.add_to_trajectory_builder(state.wrapped.as_mut());
    }
}

/// Trajectory builder front end whose sensor data goes through a collator.
pub struct CollatedTrajectoryBuilder {
    collator: Arc<dyn CollatorInterface>,
    trajectory_id: i32,
    is_collated_sensor: HashMap<SensorId, bool>,
    forwarder: Arc<CollatedDataForwarder>,
}

impl CollatedTrajectoryBuilder {
    /// Registers every collated sensor of `expected_sensor_ids` with `collator`.
    ///
    /// Landmark and fixed-frame-pose sensors take part only when enabled in
    /// `options`; the rest are left for the caller to deliver directly.
    pub fn new(
        options: &TrajectoryBuilderOptions,
        collator: Arc<dyn CollatorInterface>,
        trajectory_id: i32,
        expected_sensor_ids: &BTreeSet<ExpectedSensorId>,
        wrapped: Box<dyn TrajectoryBuilder>,
    ) -> Self {
        Self::with_rate_logging_period(
            options,
            collator,
            trajectory_id,
            expected_sensor_ids,
            wrapped,
            Duration::from_secs_f64(DEFAULT_RATE_LOGGING_PERIOD_S),
        )
    }

    /// Like [`new`](Self::new), logging sensor rates every
    /// `rate_logging_period` (typically `CollatorOptions::rate_logging_period`).
    pub fn with_rate_logging_period(
        options: &TrajectoryBuilderOptions,
        collator: Arc<dyn CollatorInterface>,
        trajectory_id: i32,
        expected_sensor_ids: &BTreeSet<ExpectedSensorId>,
        wrapped: Box<dyn TrajectoryBuilder>,
        rate_logging_period: Duration,
    ) -> Self {
        Self::with_clock(
            options,
            collator,
            trajectory_id,
            expected_sensor_ids,
            wrapped,
            Arc::new(SystemClock),
            rate_logging_period,
        )
    }

    /// Like [`new`](Self::new) with an explicit wall clock and rate logging period.
    pub fn with_clock(
        options: &TrajectoryBuilderOptions,
        collator: Arc<dyn CollatorInterface>,
        trajectory_id: i32,
        expected_sensor_ids: &BTreeSet<ExpectedSensorId>,
        wrapped: Box<dyn TrajectoryBuilder>,
        clock: Arc<dyn Clock>,
        rate_logging_period: Duration,
    ) -> Self {
        let mut is_collated_sensor = HashMap::new();
        let mut collated_ids = BTreeSet::new();
        for sensor in expected_sensor_ids {
            let excluded = match sensor.sensor_type {
                SensorType::Landmark => !options.collate_landmarks,
                SensorType::FixedFramePose => !options.collate_fixed_frame,
                _ => false,
            };
            if excluded {
                continue;
            }
            collated_ids.insert(sensor.id.clone());
            is_collated_sensor.insert(sensor.id.clone(), true);
        }

        let forwarder = Arc::new(CollatedDataForwarder {
            trajectory_id,
            state: Mutex::new(ForwarderState {
                wrapped,
                rate_log: SensorRateLog::new(rate_logging_period, clock.now()),
            }),
            clock,
        });
        collator.add_trajectory(trajectory_id, &collated_ids, forwarder.clone());

        Self {
            collator,
            trajectory_id,
            is_collated_sensor,
            forwarder,
        }
    }

    pub fn trajectory_id(&self) -> i32 {
        self.trajectory_id
    }

    pub fn rate_logging_period(&self) -> Duration {
        self.forwarder
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .rate_log
            .period
    }

    /// Whether samples of `sensor_id` currently go through the collator.
    pub fn is_collated_sensor(&self, sensor_id: &str) -> bool {
        self.is_collated_sensor
            .get(sensor_id)
            .copied()
            .unwrap_or(false)
    }

    /// Hands `data` to the collator. Routing of non-collated sensors happens
    /// before this call.
    pub fn add_data(&self, data: Box<dyn SensorData>) {
        self.collator.add_sensor_data(self.trajectory_id, data);
    }

    /// Stops collating `sensor_id`; buffered samples are dropped.
    ///
    /// # Panics
    /// If the sensor is not currently collated.
    #[instrument(skip(self), fields(trajectory_id = self.trajectory_id))]
    pub fn pause_collating(&mut self, sensor_id: &SensorId) {
        let collated = self
            .is_collated_sensor
            .entry(sensor_id.clone())
            .or_insert(false);
        assert!(*collated, "sensor '{sensor_id}' is not being collated");
        *collated = false;
        self.collator.pause_collating(self.trajectory_id, sensor_id);
    }

    /// Collates `sensor_id` again.
    ///
    /// # Panics
    /// If the sensor is already collated.
    #[instrument(skip(self), fields(trajectory_id = self.trajectory_id))]
    pub fn resume_collating(&mut self, sensor_id: &SensorId) {
        let collated = self
            .is_collated_sensor
            .entry(sensor_id.clone())
            .or_insert(false);
        assert!(!*collated, "sensor '{sensor_id}' is already being collated");
        *collated = true;
        self.collator
            .resume_collating(self.trajectory_id, sensor_id, self.forwarder.clone());
    }

    /// Marks the trajectory's queues finished; buffered samples still arrive.
    pub fn finish(&self) {
        self.collator.finish_trajectory(self.trajectory_id);
    }
}
