//! Collator with an independent merge per trajectory.
//!
//! Samples are ordered within a trajectory only, so a silent sensor of one
//! trajectory never holds back another.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use contracts::{QueueKey, SensorData, SensorId};
use tracing::{info, instrument};

use crate::collator::{CollatorInterface, TrajectoryKeys};
use crate::ordered_multi_queue::{CollatedSensorDataHandler, OrderedMultiQueue};

#[derive(Debug, Default)]
struct TrajectoryQueues {
    queue: OrderedMultiQueue,
    trajectory_keys: TrajectoryKeys,
}

type SharedQueues = Arc<Mutex<TrajectoryQueues>>;

#[derive(Debug, Default)]
pub struct TrajectoryCollator {
    trajectories: RwLock<HashMap<i32, SharedQueues>>,
}

impl TrajectoryCollator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_trajectories(&self) -> usize {
        self.trajectories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// # Panics
    /// If `trajectory_id` was never added.
    fn trajectory(&self, trajectory_id: i32) -> SharedQueues {
        let trajectories = self
            .trajectories
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        match trajectories.get(&trajectory_id) {
            Some(queues) => Arc::clone(queues),
            None => panic!("trajectory {trajectory_id} was never added"),
        }
    }

    fn lock(queues: &SharedQueues) -> MutexGuard<'_, TrajectoryQueues> {
        queues.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CollatorInterface for TrajectoryCollator {
    #[instrument(
        name = "trajectory_collator_add_trajectory",
        skip(self, expected_sensor_ids, handler),
        fields(sensors = ?expected_sensor_ids)
    )]
    fn add_trajectory(
        &self,
        trajectory_id: i32,
        expected_sensor_ids: &BTreeSet<SensorId>,
        handler: Arc<dyn CollatedSensorDataHandler>,
    ) {
        let mut queues = TrajectoryQueues::default();
        queues.trajectory_keys.add_trajectory(
            &mut queues.queue,
            trajectory_id,
            expected_sensor_ids,
            &handler,
        );

        let mut trajectories = self
            .trajectories
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        assert!(
            !trajectories.contains_key(&trajectory_id),
            "trajectory {trajectory_id} was already added"
        );
        trajectories.insert(trajectory_id, Arc::new(Mutex::new(queues)));
    }

    #[instrument(name = "trajectory_collator_finish_trajectory", skip(self))]
    fn finish_trajectory(&self, trajectory_id: i32) {
        let shared = self.trajectory(trajectory_id);
        let mut guard = Self::lock(&shared);
        let queues = &mut *guard;
        queues
            .trajectory_keys
            .finish_trajectory(&mut queues.queue, trajectory_id);
    }

    #[instrument(
        name = "trajectory_collator_add_sensor_data",
        level = "trace",
        skip(self, data),
        fields(sensor_id = %data.sensor_id(), time = %data.time())
    )]
    fn add_sensor_data(&self, trajectory_id: i32, data: Box<dyn SensorData>) {
        let key = QueueKey::new(trajectory_id, data.sensor_id().clone());
        let shared = self.trajectory(trajectory_id);
        Self::lock(&shared).queue.add(&key, data);
    }

    #[instrument(name = "trajectory_collator_flush", skip(self))]
    fn flush(&self) {
        let all: Vec<SharedQueues> = self
            .trajectories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        for shared in all {
            Self::lock(&shared).queue.flush();
        }
    }

    /// Trajectories never wait on each other here.
    fn blocking_trajectory_id(&self) -> Option<i32> {
        None
    }

    #[instrument(name = "trajectory_collator_pause", skip(self))]
    fn pause_collating(&self, trajectory_id: i32, sensor_id: &SensorId) {
        info!(trajectory_id, %sensor_id, "Pausing to collate sensor");
        let shared = self.trajectory(trajectory_id);
        let mut guard = Self::lock(&shared);
        let queues = &mut *guard;
        queues
            .trajectory_keys
            .pause(&mut queues.queue, QueueKey::new(trajectory_id, sensor_id.clone()));
    }

    #[instrument(name = "trajectory_collator_resume", skip(self, handler))]
    fn resume_collating(
        &self,
        trajectory_id: i32,
        sensor_id: &SensorId,
        handler: Arc<dyn CollatedSensorDataHandler>,
    ) {
        info!(trajectory_id, %sensor_id, "Resuming to collate sensor");
        let shared = self.trajectory(trajectory_id);
        let mut guard = Self::lock(&shared);
        let queues = &mut *guard;
        queues.trajectory_keys.resume(
            &mut queues.queue,
            QueueKey::new(trajectory_id, sensor_id.clone()),
            handler,
        );
    }
}
