//! Shared collator: one merge across every trajectory.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use contracts::{QueueKey, SensorData, SensorId};
use observability::CollationSummary;
use tracing::{info, instrument};

use crate::ordered_multi_queue::{CollatedSensorDataHandler, OrderedMultiQueue};

/// Entry point trajectories use to get their sensor data ordered.
///
/// Precondition violations (unknown trajectory or sensor, double pause,
/// double resume, any use of a finished trajectory) are wiring bugs and panic.
pub trait CollatorInterface: Send + Sync {
    /// Registers one queue per expected sensor of `trajectory_id`. Released
    /// samples go to `handler` together with their sensor id.
    fn add_trajectory(
        &self,
        trajectory_id: i32,
        expected_sensor_ids: &BTreeSet<SensorId>,
        handler: Arc<dyn CollatedSensorDataHandler>,
    );

    /// Marks every registered queue of the trajectory finished. Buffered data
    /// is still delivered; the trajectory id cannot be used again.
    fn finish_trajectory(&self, trajectory_id: i32);

    fn add_sensor_data(&self, trajectory_id: i32, data: Box<dyn SensorData>);

    /// Delivers everything still buffered, regardless of readiness.
    fn flush(&self);

    /// Trajectory whose silent sensor currently holds back the merge.
    fn blocking_trajectory_id(&self) -> Option<i32>;

    /// Stops collating one sensor; its buffered samples are dropped.
    fn pause_collating(&self, trajectory_id: i32, sensor_id: &SensorId);

    /// Starts collating a paused sensor again with a fresh, empty queue.
    fn resume_collating(
        &self,
        trajectory_id: i32,
        sensor_id: &SensorId,
        handler: Arc<dyn CollatedSensorDataHandler>,
    );
}

/// Queue keys registered per trajectory, in registration order
#[derive(Debug, Default)]
pub(crate) struct TrajectoryKeys {
    keys: HashMap<i32, Vec<QueueKey>>,
    /// Finishing is terminal: these ids never take queues again.
    finished: HashSet<i32>,
}

impl TrajectoryKeys {
    fn assert_not_finished(&self, trajectory_id: i32, action: &str) {
        assert!(
            !self.finished.contains(&trajectory_id),
            "cannot {action} trajectory {trajectory_id}: it is already finished"
        );
    }

    pub(crate) fn add_trajectory(
        &mut self,
        queue: &mut OrderedMultiQueue,
        trajectory_id: i32,
        expected_sensor_ids: &BTreeSet<SensorId>,
        handler: &Arc<dyn CollatedSensorDataHandler>,
    ) {
        self.assert_not_finished(trajectory_id, "add");
        let keys = self.keys.entry(trajectory_id).or_default();
        for sensor_id in expected_sensor_ids {
            let key = QueueKey::new(trajectory_id, sensor_id.clone());
            queue.add_queue(key.clone(), Arc::clone(handler));
            keys.push(key);
        }
    }

    pub(crate) fn finish_trajectory(&mut self, queue: &mut OrderedMultiQueue, trajectory_id: i32) {
        self.assert_not_finished(trajectory_id, "finish");
        self.finished.insert(trajectory_id);
        for key in self.keys.remove(&trajectory_id).unwrap_or_default() {
            // A flush may already have finished and drained the queue.
            if queue.is_finished(&key) == Some(false) {
                queue.mark_queue_as_finished(&key);
            }
        }
        queue.retire_trajectory(trajectory_id);
    }

    pub(crate) fn pause(&mut self, queue: &mut OrderedMultiQueue, key: QueueKey) {
        self.assert_not_finished(key.trajectory_id, "pause a sensor of");
        let keys = self.keys.entry(key.trajectory_id).or_default();
        let Some(position) = keys.iter().position(|k| *k == key) else {
            panic!("cannot pause {key}: sensor is not being collated");
        };
        keys.remove(position);
        queue.discard_queue(&key);
    }

    pub(crate) fn resume(
        &mut self,
        queue: &mut OrderedMultiQueue,
        key: QueueKey,
        handler: Arc<dyn CollatedSensorDataHandler>,
    ) {
        self.assert_not_finished(key.trajectory_id, "resume a sensor of");
        let keys = self.keys.entry(key.trajectory_id).or_default();
        assert!(
            !keys.contains(&key),
            "cannot resume {key}: sensor is already being collated"
        );
        queue.add_queue(key.clone(), handler);
        keys.push(key);
    }

    pub(crate) fn keys(&self, trajectory_id: i32) -> &[QueueKey] {
        self.keys
            .get(&trajectory_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

#[derive(Debug, Default)]
struct CollatorState {
    queue: OrderedMultiQueue,
    trajectory_keys: TrajectoryKeys,
}

/// Collator with a single merge shared by all trajectories.
///
/// All operations serialise on one lock; handlers run inline under it, so a
/// sample released by trajectory A's `add_sensor_data` may be delivered to
/// trajectory B on A's thread.
#[derive(Debug, Default)]
pub struct Collator {
    state: Mutex<CollatorState>,
}

impl Collator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys currently collated for `trajectory_id`, in registration order.
    pub fn queue_keys(&self, trajectory_id: i32) -> Vec<QueueKey> {
        self.lock().trajectory_keys.keys(trajectory_id).to_vec()
    }

    pub fn num_buffered(&self) -> usize {
        self.lock().queue.num_buffered()
    }

    pub fn stats_summary(&self) -> CollationSummary {
        self.lock().queue.stats().summary()
    }

    fn lock(&self) -> MutexGuard<'_, CollatorState> {
        // A poisoned lock means a precondition panic already happened.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CollatorInterface for Collator {
    #[instrument(
        name = "collator_add_trajectory",
        skip(self, expected_sensor_ids, handler),
        fields(sensors = ?expected_sensor_ids)
    )]
    fn add_trajectory(
        &self,
        trajectory_id: i32,
        expected_sensor_ids: &BTreeSet<SensorId>,
        handler: Arc<dyn CollatedSensorDataHandler>,
    ) {
        let mut guard = self.lock();
        let state = &mut *guard;
        state.trajectory_keys.add_trajectory(
            &mut state.queue,
            trajectory_id,
            expected_sensor_ids,
            &handler,
        );
    }

    #[instrument(name = "collator_finish_trajectory", skip(self))]
    fn finish_trajectory(&self, trajectory_id: i32) {
        let mut guard = self.lock();
        let state = &mut *guard;
        state
            .trajectory_keys
            .finish_trajectory(&mut state.queue, trajectory_id);
    }

    #[instrument(
        name = "collator_add_sensor_data",
        level = "trace",
        skip(self, data),
        fields(sensor_id = %data.sensor_id(), time = %data.time())
    )]
    fn add_sensor_data(&self, trajectory_id: i32, data: Box<dyn SensorData>) {
        let key = QueueKey::new(trajectory_id, data.sensor_id().clone());
        self.lock().queue.add(&key, data);
    }

    #[instrument(name = "collator_flush", skip(self))]
    fn flush(&self) {
        self.lock().queue.flush();
    }

    fn blocking_trajectory_id(&self) -> Option<i32> {
        self.lock().queue.blocker().map(|key| key.trajectory_id)
    }

    #[instrument(name = "collator_pause", skip(self))]
    fn pause_collating(&self, trajectory_id: i32, sensor_id: &SensorId) {
        info!(trajectory_id, %sensor_id, "Pausing to collate sensor");
        let mut guard = self.lock();
        let state = &mut *guard;
        state
            .trajectory_keys
            .pause(&mut state.queue, QueueKey::new(trajectory_id, sensor_id.clone()));
    }

    #[instrument(name = "collator_resume", skip(self, handler))]
    fn resume_collating(
        &self,
        trajectory_id: i32,
        sensor_id: &SensorId,
        handler: Arc<dyn CollatedSensorDataHandler>,
    ) {
        info!(trajectory_id, %sensor_id, "Resuming to collate sensor");
        let mut guard = self.lock();
        let state = &mut *guard;
        state.trajectory_keys.resume(
            &mut state.queue,
            QueueKey::new(trajectory_id, sensor_id.clone()),
            handler,
        );
    }
}
