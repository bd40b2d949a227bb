//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 配置 -> collator -> 轨迹构建器 的完整链路
//! - 多轨迹之间的阻塞行为
//! - 暂停/恢复与结束轨迹的语义

#[cfg(test)]
mod e2e_tests {
    use std::collections::BTreeSet;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use collator::{
        create_collator, CollatedTrajectoryBuilder, Collator, CollatorInterface, ManualClock,
    };
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{
        Dispatchable, ExpectedSensorId, FixedFramePoseData, ImuData, LandmarkData, OdometryData,
        QueueKey, SensorData, SensorId, SensorType, Time, TimedPointCloudData, TrajectoryBuilder,
        TrajectoryBuilderOptions,
    };
    use nalgebra::{Isometry3, Vector3};
    use observability::CollationSummary;

    /// Builder that logs "<sensor>@<seconds>" for every sample it receives
    #[derive(Clone, Default)]
    struct LocalSlamStub {
        received: Arc<Mutex<Vec<String>>>,
    }

    impl LocalSlamStub {
        fn push(&self, sensor_id: &SensorId, time: Time) {
            self.received
                .lock()
                .unwrap()
                .push(format!("{sensor_id}@{}", time.as_seconds()));
        }

        fn received(&self) -> Vec<String> {
            self.received.lock().unwrap().clone()
        }
    }

    impl TrajectoryBuilder for LocalSlamStub {
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

    fn imu(sensor_id: &str, seconds: f64) -> Box<dyn SensorData> {
        Dispatchable::boxed(
            sensor_id,
            ImuData {
                time: Time::from_seconds(seconds),
                linear_acceleration: Vector3::new(0.0, 0.0, 9.81),
                angular_velocity: Vector3::zeros(),
            },
        )
    }

    fn scan(sensor_id: &str, seconds: f64) -> Box<dyn SensorData> {
        Dispatchable::boxed(
            sensor_id,
            TimedPointCloudData {
                time: Time::from_seconds(seconds),
                origin: Vector3::zeros(),
                ranges: Vec::new(),
            },
        )
    }

    fn odometry(sensor_id: &str, seconds: f64) -> Box<dyn SensorData> {
        Dispatchable::boxed(
            sensor_id,
            OdometryData {
                time: Time::from_seconds(seconds),
                pose: Isometry3::identity(),
            },
        )
    }

    fn landmark(sensor_id: &str, seconds: f64) -> Box<dyn SensorData> {
        Dispatchable::boxed(
            sensor_id,
            LandmarkData {
                time: Time::from_seconds(seconds),
                observations: Vec::new(),
            },
        )
    }

    fn expected(sensors: &[ExpectedSensorId]) -> BTreeSet<ExpectedSensorId> {
        sensors.iter().cloned().collect()
    }

    fn builder(
        collator: Arc<dyn CollatorInterface>,
        trajectory_id: i32,
        options: TrajectoryBuilderOptions,
        sensors: &[(SensorType, &str)],
    ) -> (CollatedTrajectoryBuilder, LocalSlamStub) {
        let stub = LocalSlamStub::default();
        let sensors: Vec<_> = sensors
            .iter()
            .map(|(sensor_type, id)| ExpectedSensorId::new(*sensor_type, *id))
            .collect();
        let builder = CollatedTrajectoryBuilder::with_clock(
            &options,
            collator,
            trajectory_id,
            &expected(&sensors),
            Box::new(stub.clone()),
            Arc::new(ManualClock::new()),
            Duration::from_secs(15),
        );
        (builder, stub)
    }

    /// A scan older than every buffered IMU sample goes out first; the IMU
    /// samples wait until the scan stream moves past them.
    #[test]
    fn test_late_scan_is_released_before_buffered_imu() {
        let collator: Arc<dyn CollatorInterface> = Arc::new(Collator::new());
        let (builder, slam) = builder(
            collator,
            0,
            TrajectoryBuilderOptions::default(),
            &[(SensorType::Imu, "imu"), (SensorType::Range, "scan")],
        );

        builder.add_data(imu("imu", 1.0));
        builder.add_data(imu("imu", 2.0));
        assert!(slam.received().is_empty());

        builder.add_data(scan("scan", 0.0));
        assert_eq!(slam.received(), vec!["scan@0"]);

        builder.add_data(scan("scan", 3.0));
        assert_eq!(slam.received(), vec!["scan@0", "imu@1", "imu@2"]);

        builder.finish();
        assert_eq!(slam.received(), vec!["scan@0", "imu@1", "imu@2", "scan@3"]);
    }

    #[test]
    fn test_finishing_silent_sensor_unblocks_the_rest() {
        let collator: Arc<dyn CollatorInterface> = Arc::new(Collator::new());
        let (builder, slam) = builder(
            collator.clone(),
            0,
            TrajectoryBuilderOptions::default(),
            &[(SensorType::Imu, "imu"), (SensorType::Range, "scan")],
        );

        builder.add_data(imu("imu", 1.0));
        assert_eq!(collator.blocking_trajectory_id(), Some(0));

        builder.finish();
        assert_eq!(slam.received(), vec!["imu@1"]);
        assert_eq!(collator.blocking_trajectory_id(), None);
    }

    /// A trajectory without landmark collation keeps its other sensors in
    /// the merge.
    #[test]
    fn test_odometry_only_trajectory_is_collated() {
        let collator = Arc::new(Collator::new());
        let (builder, slam) = builder(
            collator.clone(),
            1,
            TrajectoryBuilderOptions::default(),
            &[(SensorType::Odometry, "odom"), (SensorType::Landmark, "tags")],
        );

        assert!(builder.is_collated_sensor("odom"));
        assert!(!builder.is_collated_sensor("tags"));
        assert_eq!(collator.queue_keys(1), vec![QueueKey::new(1, "odom")]);

        builder.add_data(odometry("odom", 0.5));
        assert_eq!(slam.received(), vec!["odom@0.5"]);
    }

    #[test]
    fn test_landmarks_collated_when_enabled() {
        let collator = Arc::new(Collator::new());
        let options = TrajectoryBuilderOptions {
            collate_landmarks: true,
            ..Default::default()
        };
        let (builder, slam) = builder(
            collator.clone(),
            1,
            options,
            &[(SensorType::Odometry, "odom"), (SensorType::Landmark, "tags")],
        );

        assert!(builder.is_collated_sensor("tags"));
        builder.add_data(landmark("tags", 2.0));
        builder.add_data(odometry("odom", 1.0));
        builder.add_data(odometry("odom", 3.0));
        assert_eq!(slam.received(), vec!["odom@1", "tags@2"]);
    }

    #[test]
    fn test_pause_drops_buffered_samples() {
        let collator = Arc::new(Collator::new());
        let (mut builder, slam) = builder(
            collator.clone(),
            0,
            TrajectoryBuilderOptions::default(),
            &[(SensorType::Imu, "imu"), (SensorType::Range, "scan")],
        );

        builder.add_data(imu("imu", 1.0));
        builder.add_data(imu("imu", 2.0));
        builder.pause_collating(&SensorId::from("imu"));

        assert!(!builder.is_collated_sensor("imu"));
        assert_eq!(collator.queue_keys(0), vec![QueueKey::new(0, "scan")]);
        assert_eq!(collator.num_buffered(), 0);

        builder.add_data(scan("scan", 5.0));
        builder.finish();
        assert_eq!(slam.received(), vec!["scan@5"]);

        let summary: CollationSummary = collator.stats_summary();
        assert_eq!(summary.total_discarded, 2);
        assert_eq!(summary.total_dispatched, 1);
    }

    #[test]
    fn test_resume_restores_collation_order() {
        let collator = Arc::new(Collator::new());
        let (mut builder, slam) = builder(
            collator.clone(),
            0,
            TrajectoryBuilderOptions::default(),
            &[(SensorType::Imu, "imu"), (SensorType::Range, "scan")],
        );
        let imu_id = SensorId::from("imu");

        builder.pause_collating(&imu_id);
        builder.resume_collating(&imu_id);
        assert_eq!(
            collator.queue_keys(0),
            vec![QueueKey::new(0, "scan"), QueueKey::new(0, "imu")]
        );

        // Equal timestamps still resolve by original registration order.
        builder.add_data(scan("scan", 1.0));
        builder.add_data(imu("imu", 1.0));
        builder.finish();
        assert_eq!(slam.received(), vec!["imu@1", "scan@1"]);
    }

    /// Two trajectories on the shared collator hold each other back; per
    /// trajectory collation lets each run on its own.
    #[test]
    fn test_global_versus_per_trajectory_blocking() {
        const CONFIG: &str = r#"
[collator]
kind = "global"
rate_logging_period_s = 5.0

[[trajectories]]
trajectory_id = 0
sensors = [{ type = "imu", id = "imu" }]

[[trajectories]]
trajectory_id = 1
sensors = [{ type = "imu", id = "imu" }]
"#;
        for (kind, expect_blocked) in [("global", true), ("per_trajectory", false)] {
            let content = CONFIG.replace("\"global\"", &format!("\"{kind}\""));
            let blueprint = ConfigLoader::load_from_str(&content, ConfigFormat::Toml).unwrap();
            let collator = create_collator(&blueprint.collator);

            let mut builders = Vec::new();
            for trajectory in &blueprint.trajectories {
                let stub = LocalSlamStub::default();
                let builder = CollatedTrajectoryBuilder::with_rate_logging_period(
                    &trajectory.options,
                    collator.clone(),
                    trajectory.trajectory_id,
                    &expected(&trajectory.sensors),
                    Box::new(stub.clone()),
                    blueprint.collator.rate_logging_period(),
                );
                assert_eq!(builder.rate_logging_period(), Duration::from_secs(5));
                builders.push((builder, stub));
            }

            builders[0].0.add_data(imu("imu", 1.0));
            let delivered = builders[0].1.received();
            if expect_blocked {
                assert!(delivered.is_empty(), "{kind}: {delivered:?}");
                assert_eq!(collator.blocking_trajectory_id(), Some(1));
            } else {
                assert_eq!(delivered, vec!["imu@1"], "{kind}");
                assert_eq!(collator.blocking_trajectory_id(), None);
            }

            collator.flush();
            assert_eq!(builders[0].1.received(), vec!["imu@1"], "{kind}");
        }
    }

    #[test]
    fn test_interleaved_trajectories_are_merged_by_time() {
        let collator = Arc::new(Collator::new());
        let (first, slam_a) = builder(
            collator.clone(),
            0,
            TrajectoryBuilderOptions::default(),
            &[(SensorType::Imu, "imu")],
        );
        let (second, slam_b) = builder(
            collator.clone(),
            1,
            TrajectoryBuilderOptions::default(),
            &[(SensorType::Odometry, "odom")],
        );

        first.add_data(imu("imu", 0.1));
        first.add_data(imu("imu", 0.3));
        assert!(slam_a.received().is_empty());

        second.add_data(odometry("odom", 0.2));
        assert_eq!(slam_a.received(), vec!["imu@0.1"]);
        assert_eq!(slam_b.received(), vec!["odom@0.2"]);

        second.add_data(odometry("odom", 0.4));
        assert_eq!(slam_a.received(), vec!["imu@0.1", "imu@0.3"]);
        assert_eq!(slam_b.received(), vec!["odom@0.2"]);

        first.finish();
        assert_eq!(slam_b.received(), vec!["odom@0.2", "odom@0.4"]);
        let per_queue: Vec<QueueKey> = collator.stats_summary().per_queue.into_keys().collect();
        assert_eq!(per_queue, vec![QueueKey::new(1, "odom")]);

        second.finish();
        let summary = collator.stats_summary();
        assert_eq!(summary.total_dispatched, 4);
        assert!(summary.per_queue.is_empty());
    }

    #[test]
    fn test_out_of_order_sample_is_dropped() {
        let collator = Arc::new(Collator::new());
        let (builder, slam) = builder(
            collator.clone(),
            0,
            TrajectoryBuilderOptions::default(),
            &[(SensorType::Imu, "imu"), (SensorType::Range, "scan")],
        );

        builder.add_data(imu("imu", 2.0));
        builder.add_data(scan("scan", 3.0));
        assert_eq!(slam.received(), vec!["imu@2"]);

        // Older than what the trajectory already consumed.
        builder.add_data(imu("imu", 1.0));
        builder.finish();

        assert_eq!(slam.received(), vec!["imu@2", "scan@3"]);
        assert_eq!(collator.stats_summary().total_out_of_order, 1);
    }
}
