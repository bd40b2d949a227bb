//! Merge-by-readiness over many FIFO queues.
//!
//! Each queue buffers the samples of one (trajectory, sensor) stream in arrival
//! order. A head sample is released only when every other unfinished queue has
//! a head at least as late, so nothing earlier can still show up. An empty,
//! unfinished queue therefore stalls the whole merge until it receives data or
//! is marked finished.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use contracts::{QueueKey, SensorData, SensorId, Time};
use observability::CollationStatsAggregator;
use tracing::{debug, warn};

/// Receives the samples released for one queue.
///
/// Called inline from the dispatch pass, while the owner of the queue set is
/// locked: implementations must not call back into the same collator.
pub trait CollatedSensorDataHandler: Send + Sync {
    fn handle_collated_sensor_data(&self, sensor_id: &SensorId, data: Box<dyn SensorData>);
}

impl<F> CollatedSensorDataHandler for F
where
    F: Fn(&SensorId, Box<dyn SensorData>) + Send + Sync,
{
    fn handle_collated_sensor_data(&self, sensor_id: &SensorId, data: Box<dyn SensorData>) {
        self(sensor_id, data)
    }
}

struct Queue {
    key: QueueKey,
    data: VecDeque<Box<dyn SensorData>>,
    handler: Arc<dyn CollatedSensorDataHandler>,
    finished: bool,
    last_dispatched: Option<Time>,
}

/// Set of ordered queues sharing one merge
pub struct OrderedMultiQueue {
    /// Live queues by rank; iteration order is the tie-break order
    queues: BTreeMap<u64, Queue>,
    /// Rank given to a key on first registration, kept across pause/resume
    ranks: HashMap<QueueKey, u64>,
    next_rank: u64,
    last_dispatched_per_trajectory: HashMap<i32, Time>,
    /// Finished trajectories whose queues are still draining
    retiring: HashSet<i32>,
    last_blocker: Option<QueueKey>,
    stats: CollationStatsAggregator,
}

impl fmt::Debug for OrderedMultiQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderedMultiQueue")
            .field("queues", &self.queues.len())
            .field("buffered", &self.num_buffered())
            .field("blocker", &self.blocker())
            .finish()
    }
}

impl Default for OrderedMultiQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderedMultiQueue {
    pub fn new() -> Self {
        Self {
            queues: BTreeMap::new(),
            ranks: HashMap::new(),
            next_rank: 0,
            last_dispatched_per_trajectory: HashMap::new(),
            retiring: HashSet::new(),
            last_blocker: None,
            stats: CollationStatsAggregator::new(),
        }
    }

    /// Registers an empty queue for `key`.
    ///
    /// # Panics
    /// If a queue for `key` is still registered, finished or not.
    pub fn add_queue(&mut self, key: QueueKey, handler: Arc<dyn CollatedSensorDataHandler>) {
        assert!(
            self.rank_of(&key).is_none(),
            "queue {key} is already registered"
        );

        let next_rank = &mut self.next_rank;
        let rank = *self.ranks.entry(key.clone()).or_insert_with(|| {
            let rank = *next_rank;
            *next_rank += 1;
            rank
        });

        debug!(queue = %key, rank, "queue added");
        self.queues.insert(
            rank,
            Queue {
                key,
                data: VecDeque::new(),
                handler,
                finished: false,
                last_dispatched: None,
            },
        );
    }

    /// Appends `data` to the tail of queue `key` and releases whatever became safe.
    ///
    /// # Panics
    /// If no queue is registered for `key` or it was already marked finished.
    pub fn add(&mut self, key: &QueueKey, data: Box<dyn SensorData>) {
        let Some(rank) = self.rank_of(key) else {
            panic!("cannot add data to unregistered queue {key}");
        };
        if let Some(queue) = self.queues.get_mut(&rank) {
            assert!(!queue.finished, "cannot add data to finished queue {key}");
            queue.data.push_back(data);
        }
        observability::record_sample_queued(key);
        self.dispatch();
    }

    /// Marks queue `key` as finished: it takes no more data and stops blocking
    /// once drained.
    ///
    /// # Panics
    /// If no queue is registered for `key` or it was already marked finished.
    pub fn mark_queue_as_finished(&mut self, key: &QueueKey) {
        let Some(rank) = self.rank_of(key) else {
            panic!("cannot finish unregistered queue {key}");
        };
        if let Some(queue) = self.queues.get_mut(&rank) {
            assert!(!queue.finished, "queue {key} is already finished");
            queue.finished = true;
        }
        debug!(queue = %key, "queue marked as finished");
        self.dispatch();
    }

    /// Drops queue `key` together with its buffered samples, which are never
    /// delivered. Returns how many samples were dropped.
    ///
    /// # Panics
    /// If no queue is registered for `key`.
    pub fn discard_queue(&mut self, key: &QueueKey) -> usize {
        let Some(queue) = self.rank_of(key).and_then(|rank| self.queues.remove(&rank)) else {
            panic!("cannot discard unregistered queue {key}");
        };

        let dropped = queue.data.len();
        if dropped > 0 {
            warn!(queue = %key, dropped, "discarding buffered samples");
        }
        self.stats.record_discarded(key, dropped);
        observability::record_samples_discarded(key, dropped);

        self.dispatch();
        dropped
    }

    /// Drops the bookkeeping of `trajectory_id` (tie-break ranks, last dispatched
    /// time, per-queue stats) once none of its queues is left. Queues still
    /// draining keep it alive until their last sample is released.
    pub fn retire_trajectory(&mut self, trajectory_id: i32) {
        self.retiring.insert(trajectory_id);
        self.release_retired();
    }

    /// Finishes every queue and drains all buffered samples, earliest head first.
    pub fn flush(&mut self) {
        let mut unfinished = 0usize;
        for queue in self.queues.values_mut().filter(|q| !q.finished) {
            queue.finished = true;
            unfinished += 1;
        }
        debug!(unfinished, buffered = self.num_buffered(), "flushing queues");
        self.dispatch();
        debug_assert!(self.queues.is_empty());
    }

    /// The empty, unfinished queue starving the merge.
    ///
    /// With several candidates, the one whose data could still arrive earliest
    /// wins: a queue that never dispatched anything first, then the lowest last
    /// dispatched time, then registration order.
    pub fn blocker(&self) -> Option<QueueKey> {
        self.queues
            .values()
            .filter(|queue| queue.data.is_empty() && !queue.finished)
            .min_by_key(|queue| queue.last_dispatched)
            .map(|queue| queue.key.clone())
    }

    pub fn contains(&self, key: &QueueKey) -> bool {
        self.rank_of(key).is_some()
    }

    /// `Some(true)` once `key` is finished but still draining, `None` when unregistered.
    pub fn is_finished(&self, key: &QueueKey) -> Option<bool> {
        self.rank_of(key)
            .and_then(|rank| self.queues.get(&rank))
            .map(|queue| queue.finished)
    }

    pub fn num_queues(&self) -> usize {
        self.queues.len()
    }

    pub fn num_buffered(&self) -> usize {
        self.queues.values().map(|queue| queue.data.len()).sum()
    }

    pub fn stats(&self) -> &CollationStatsAggregator {
        &self.stats
    }

    fn rank_of(&self, key: &QueueKey) -> Option<u64> {
        self.ranks
            .get(key)
            .copied()
            .filter(|rank| self.queues.contains_key(rank))
    }

    fn dispatch(&mut self) {
        loop {
            let mut drained = Vec::new();
            let mut blocked_on = None;
            let mut next: Option<(u64, Time)> = None;

            for (&rank, queue) in &self.queues {
                match queue.data.front() {
                    None if queue.finished => drained.push(rank),
                    None => {
                        if blocked_on.is_none() {
                            blocked_on = Some(queue.key.clone());
                        }
                    }
                    Some(head) => {
                        let time = head.time();
                        // Strict comparison keeps the earliest-registered queue on ties.
                        if next.map_or(true, |(_, earliest)| time < earliest) {
                            next = Some((rank, time));
                        }
                    }
                }
            }

            for rank in drained {
                if let Some(queue) = self.queues.remove(&rank) {
                    debug!(queue = %queue.key, "finished queue drained and removed");
                }
            }
            self.release_retired();

            if let Some(key) = blocked_on {
                self.note_blocker(Some(key));
                break;
            }
            let Some((rank, time)) = next else {
                self.note_blocker(None);
                break;
            };
            self.release_head(rank, time);
        }

        observability::record_queue_depth(self.num_buffered());
    }

    fn release_head(&mut self, rank: u64, time: Time) {
        let Some(queue) = self.queues.get_mut(&rank) else {
            return;
        };
        let Some(data) = queue.data.pop_front() else {
            return;
        };
        let key = queue.key.clone();

        let last = self
            .last_dispatched_per_trajectory
            .entry(key.trajectory_id)
            .or_insert(Time::MIN);
        if time < *last {
            warn!(
                queue = %key,
                time = %time,
                last_dispatched = %*last,
                "dropping sample older than already dispatched data"
            );
            self.stats.record_out_of_order(&key);
            observability::record_out_of_order_dropped(&key);
            return;
        }
        *last = time;
        queue.last_dispatched = Some(time);
        let handler = Arc::clone(&queue.handler);

        self.stats.record_dispatch(&key, time);
        observability::record_sample_dispatched(&key);
        handler.handle_collated_sensor_data(&key.sensor_id, data);
    }

    fn release_retired(&mut self) {
        if self.retiring.is_empty() {
            return;
        }
        let live: HashSet<i32> = self.queues.values().map(|q| q.key.trajectory_id).collect();
        let done: Vec<i32> = self
            .retiring
            .iter()
            .copied()
            .filter(|id| !live.contains(id))
            .collect();
        for trajectory_id in done {
            self.retiring.remove(&trajectory_id);
            self.ranks.retain(|key, _| key.trajectory_id != trajectory_id);
            self.last_dispatched_per_trajectory.remove(&trajectory_id);
            self.stats.retire_trajectory(trajectory_id);
            debug!(trajectory_id, "trajectory bookkeeping released");
        }
    }

    fn note_blocker(&mut self, blocker: Option<QueueKey>) {
        if self.last_blocker == blocker {
            return;
        }
        match &blocker {
            Some(key) => debug!(queue = %key, "waiting for data"),
            None => debug!("no queue is blocking"),
        }
        observability::record_blocking_trajectory(blocker.as_ref().map(|key| key.trajectory_id));
        self.last_blocker = blocker;
    }
}
