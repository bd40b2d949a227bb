//! CollationBlueprint - Config Loader 输出
//!
//! 描述 collator 的选择、可观测性设置，以及各轨迹及其期望的传感器。

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ExpectedSensorId;

/// 传感器频率日志的默认输出周期 (墙钟秒)
pub const DEFAULT_RATE_LOGGING_PERIOD_S: f64 = 15.0;

/// 配置版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// 完整的排序合并配置蓝图
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollationBlueprint {
    #[serde(default)]
    pub version: ConfigVersion,

    #[serde(default)]
    pub collator: CollatorOptions,

    #[serde(default)]
    pub observability: ObservabilityOptions,

    #[serde(default)]
    pub trajectories: Vec<TrajectoryBlueprint>,
}

/// 合并传感器数据流所用的 collator 实现
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollatorKind {
    /// 所有轨迹共享一个合并队列
    #[default]
    Global,
    /// 每条轨迹独立合并，轨迹之间互不阻塞
    PerTrajectory,
}

/// Collator 全局选项
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollatorOptions {
    #[serde(default)]
    pub kind: CollatorKind,

    /// 两轮传感器频率日志之间的墙钟秒数
    #[serde(default = "default_rate_logging_period")]
    pub rate_logging_period_s: f64,
}

fn default_rate_logging_period() -> f64 {
    DEFAULT_RATE_LOGGING_PERIOD_S
}

impl CollatorOptions {
    /// 以 `Duration` 返回 `rate_logging_period_s`；校验不通过的值回退为默认周期。
    pub fn rate_logging_period(&self) -> Duration {
        Duration::try_from_secs_f64(self.rate_logging_period_s)
            .ok()
            .filter(|period| !period.is_zero())
            .unwrap_or(Duration::from_secs_f64(DEFAULT_RATE_LOGGING_PERIOD_S))
    }
}

impl Default for CollatorOptions {
    fn default() -> Self {
        Self {
            kind: CollatorKind::default(),
            rate_logging_period_s: DEFAULT_RATE_LOGGING_PERIOD_S,
        }
    }
}

/// 日志输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Json,
    /// 多行、便于人工阅读
    Pretty,
    Compact,
}

/// 日志与指标导出设置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservabilityOptions {
    #[serde(default)]
    pub log_format: LogFormat,

    /// 未设置 `RUST_LOG` 时使用的过滤指令
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Prometheus 监听端口；缺省时不启动导出
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics_port: Option<u16>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityOptions {
    fn default() -> Self {
        Self {
            log_format: LogFormat::default(),
            log_level: default_log_level(),
            metrics_port: None,
        }
    }
}

/// 与排序合并相关的单轨迹选项
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrajectoryBuilderOptions {
    /// landmark 观测是否经过 collator
    #[serde(default)]
    pub collate_landmarks: bool,

    /// 固定坐标系位姿是否经过 collator
    #[serde(default)]
    pub collate_fixed_frame: bool,
}

/// 一条轨迹及其期望的传感器
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrajectoryBlueprint {
    pub trajectory_id: i32,

    #[serde(default)]
    pub options: TrajectoryBuilderOptions,

    pub sensors: Vec<ExpectedSensorId>,
}
