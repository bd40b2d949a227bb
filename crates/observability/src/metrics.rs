//! 排序合并 (collation) 指标收集模块
//!
//! 自由函数写入全局 `metrics` recorder (安装了 Prometheus 时导出，否则为空操作)。
//! [`CollationStatsAggregator`] 在内存中保留一份统计，用于汇总和测试。

use std::collections::BTreeMap;
use std::fmt;

use contracts::{QueueKey, Time};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};

/// 向已安装的 recorder 注册指标说明和单位
pub fn describe_metrics() {
    describe_counter!(
        "collator_samples_queued_total",
        Unit::Count,
        "Samples accepted into a collation queue"
    );
    describe_counter!(
        "collator_samples_dispatched_total",
        Unit::Count,
        "Samples released to their trajectory in time order"
    );
    describe_counter!(
        "collator_samples_discarded_total",
        Unit::Count,
        "Buffered samples dropped when collation of a sensor was paused"
    );
    describe_counter!(
        "collator_samples_out_of_order_total",
        Unit::Count,
        "Samples dropped for being older than their trajectory's last dispatch"
    );
    describe_gauge!(
        "collator_buffered_samples",
        Unit::Count,
        "Samples waiting in collation queues"
    );
    describe_gauge!(
        "collator_blocking_trajectory_id",
        "Trajectory whose empty queue holds back dispatch, -1 when none"
    );
    describe_histogram!(
        "collator_sensor_rate_hz",
        "Sensor rate observed over the rate logging window"
    );
}

/// 样本进入排序队列
pub fn record_sample_queued(key: &QueueKey) {
    counter!(
        "collator_samples_queued_total",
        "trajectory_id" => key.trajectory_id.to_string(),
        "sensor_id" => key.sensor_id.to_string()
    )
    .increment(1);
}

/// 样本被分发给所属轨迹
pub fn record_sample_dispatched(key: &QueueKey) {
    counter!(
        "collator_samples_dispatched_total",
        "trajectory_id" => key.trajectory_id.to_string(),
        "sensor_id" => key.sensor_id.to_string()
    )
    .increment(1);
}

/// 暂停队列时丢弃的缓存样本
pub fn record_samples_discarded(key: &QueueKey, count: usize) {
    if count == 0 {
        return;
    }
    counter!(
        "collator_samples_discarded_total",
        "trajectory_id" => key.trajectory_id.to_string(),
        "sensor_id" => key.sensor_id.to_string()
    )
    .increment(count as u64);
}

/// 样本早于该轨迹最后分发的时间，被丢弃
pub fn record_out_of_order_dropped(key: &QueueKey) {
    counter!(
        "collator_samples_out_of_order_total",
        "trajectory_id" => key.trajectory_id.to_string(),
        "sensor_id" => key.sensor_id.to_string()
    )
    .increment(1);
}

/// 一个 collator 所有队列中缓存的样本总数
pub fn record_queue_depth(depth: usize) {
    gauge!("collator_buffered_samples").set(depth as f64);
}

/// 当前阻塞合并的轨迹，无阻塞时为 `-1`
pub fn record_blocking_trajectory(trajectory_id: Option<i32>) {
    gauge!("collator_blocking_trajectory_id").set(trajectory_id.map_or(-1.0, f64::from));
}

/// 日志窗口内观测到的传感器频率
pub fn record_sensor_rate(sensor_id: &str, rate_hz: f64) {
    histogram!("collator_sensor_rate_hz", "sensor_id" => sensor_id.to_string()).record(rate_hz);
}

/// 单个 collator 的内存分发统计
#[derive(Debug, Clone, Default)]
pub struct CollationStatsAggregator {
    dispatched: BTreeMap<QueueKey, u64>,
    discarded: BTreeMap<QueueKey, u64>,
    out_of_order: BTreeMap<QueueKey, u64>,
    /// 同一队列相邻两次分发之间的间隔 (秒)
    gaps: BTreeMap<QueueKey, RunningStats>,
    last_time: BTreeMap<QueueKey, Time>,
    /// 已退役轨迹并入的总数：(分发, 丢弃, 乱序)
    retired: (u64, u64, u64),
}

impl CollationStatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_dispatch(&mut self, key: &QueueKey, time: Time) {
        *self.dispatched.entry(key.clone()).or_insert(0) += 1;
        if let Some(last) = self.last_time.insert(key.clone(), time) {
            self.gaps
                .entry(key.clone())
                .or_default()
                .push(time.seconds_since(last));
        }
    }

    pub fn record_discarded(&mut self, key: &QueueKey, count: usize) {
        if count > 0 {
            *self.discarded.entry(key.clone()).or_insert(0) += count as u64;
        }
    }

    pub fn record_out_of_order(&mut self, key: &QueueKey) {
        *self.out_of_order.entry(key.clone()).or_insert(0) += 1;
    }

    /// 将 `trajectory_id` 的各队列统计并入总数，并删除这些条目
    pub fn retire_trajectory(&mut self, trajectory_id: i32) {
        fn drain(map: &mut BTreeMap<QueueKey, u64>, trajectory_id: i32) -> u64 {
            let mut total = 0;
            map.retain(|key, count| {
                let keep = key.trajectory_id != trajectory_id;
                if !keep {
                    total += *count;
                }
                keep
            });
            total
        }

        self.retired.0 += drain(&mut self.dispatched, trajectory_id);
        self.retired.1 += drain(&mut self.discarded, trajectory_id);
        self.retired.2 += drain(&mut self.out_of_order, trajectory_id);
        self.gaps.retain(|key, _| key.trajectory_id != trajectory_id);
        self.last_time.retain(|key, _| key.trajectory_id != trajectory_id);
    }

    pub fn dispatched(&self, key: &QueueKey) -> u64 {
        self.dispatched.get(key).copied().unwrap_or(0)
    }

    pub fn summary(&self) -> CollationSummary {
        CollationSummary {
            total_dispatched: self.retired.0 + self.dispatched.values().sum::<u64>(),
            total_discarded: self.retired.1 + self.discarded.values().sum::<u64>(),
            total_out_of_order: self.retired.2 + self.out_of_order.values().sum::<u64>(),
            per_queue: self
                .dispatched
                .iter()
                .map(|(key, count)| {
                    let gaps = self.gaps.get(key).map(StatsSummary::from).unwrap_or_default();
                    (key.clone(), (*count, gaps))
                })
                .collect(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Clone, Default)]
pub struct CollationSummary {
    pub total_dispatched: u64,
    pub total_discarded: u64,
    pub total_out_of_order: u64,
    /// 存活轨迹每个队列的分发次数与样本间隔 (秒)
    pub per_queue: BTreeMap<QueueKey, (u64, StatsSummary)>,
}

impl fmt::Display for CollationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Collation Summary ===")?;
        writeln!(f, "Dispatched samples: {}", self.total_dispatched)?;
        writeln!(f, "Discarded on pause: {}", self.total_discarded)?;
        writeln!(f, "Dropped out of order: {}", self.total_out_of_order)?;
        for (key, (count, gaps)) in &self.per_queue {
            writeln!(f, "  {key}: {count} samples, gap (s) {gaps}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线均值/方差 (Welford 算法)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 总体方差
    pub fn population_variance(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.m2 / self.count as f64
        }
    }

    /// 样本方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_stats() {
        let mut stats = RunningStats::default();
        for value in [1.0, 2.0, 3.0, 4.0, 5.0] {
            stats.push(value);
        }

        assert_eq!(stats.count(), 5);
        assert!((stats.mean() - 3.0).abs() < 1e-10);
        assert!((stats.min() - 1.0).abs() < 1e-10);
        assert!((stats.max() - 5.0).abs() < 1e-10);
        assert!((stats.variance() - 2.5).abs() < 1e-10);
        assert!((stats.population_variance() - 2.0).abs() < 1e-10);
    }

    #[test]
    fn test_aggregator_tracks_gaps_per_queue() {
        let mut aggregator = CollationStatsAggregator::new();
        let imu = QueueKey::new(0, "imu");
        let scan = QueueKey::new(0, "scan");

        aggregator.record_dispatch(&imu, Time::from_seconds(1.0));
        aggregator.record_dispatch(&scan, Time::from_seconds(1.05));
        aggregator.record_dispatch(&imu, Time::from_seconds(1.5));
        aggregator.record_discarded(&scan, 2);
        aggregator.record_out_of_order(&imu);

        let summary = aggregator.summary();
        assert_eq!(summary.total_dispatched, 3);
        assert_eq!(summary.total_discarded, 2);
        assert_eq!(summary.total_out_of_order, 1);
        assert_eq!(aggregator.dispatched(&imu), 2);

        let (count, gaps) = &summary.per_queue[&imu];
        assert_eq!(*count, 2);
        assert_eq!(gaps.count, 1);
        assert!((gaps.mean - 0.5).abs() < 1e-9);
        assert_eq!(summary.per_queue[&scan].1.count, 0);
    }

    #[test]
    fn test_retired_trajectory_keeps_totals_only() {
        let mut aggregator = CollationStatsAggregator::new();
        let imu = QueueKey::new(0, "imu");
        let odom = QueueKey::new(1, "odom");
        aggregator.record_dispatch(&imu, Time::from_seconds(1.0));
        aggregator.record_dispatch(&imu, Time::from_seconds(2.0));
        aggregator.record_discarded(&imu, 3);
        aggregator.record_dispatch(&odom, Time::from_seconds(1.5));

        aggregator.retire_trajectory(0);

        let summary = aggregator.summary();
        assert_eq!(summary.total_dispatched, 3);
        assert_eq!(summary.total_discarded, 3);
        assert_eq!(aggregator.dispatched(&imu), 0);
        assert_eq!(summary.per_queue.keys().collect::<Vec<_>>(), vec![&odom]);
    }

    #[test]
    fn test_summary_display() {
        let mut aggregator = CollationStatsAggregator::new();
        aggregator.record_dispatch(&QueueKey::new(1, "odom"), Time::from_seconds(0.0));

        let output = aggregator.summary().to_string();
        assert!(output.contains("Dispatched samples: 1"));
        assert!(output.contains("(1, odom): 1 samples, gap (s) N/A"));
    }
}
