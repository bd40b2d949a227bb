//! # Observability
//!
//! 可观测性模块：Tracing + Prometheus 指标。
//!
//! ## 功能
//!
//! - 按 `[observability]` 配置初始化 Tracing (JSON/Pretty/Compact 格式)
//! - Prometheus 指标导出，附带指标说明
//! - 内存中的分发统计 ([`CollationStatsAggregator`])
//!
//! ## 使用示例
//!
//! ```ignore
//! let blueprint = config_loader::ConfigLoader::load_from_path(path)?;
//! observability::init_with_config(&blueprint.observability)?;
//!
//! let collator = collator::Collator::new();
//! // ... 喂入各轨迹数据 ...
//! println!("{}", collator.stats_summary());
//! ```

pub mod metrics;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer, Registry};

pub use contracts::{LogFormat, ObservabilityOptions};

pub use crate::metrics::{
    describe_metrics, record_blocking_trajectory, record_out_of_order_dropped,
    record_queue_depth, record_sample_dispatched, record_sample_queued,
    record_samples_discarded, record_sensor_rate, CollationStatsAggregator, CollationSummary,
    RunningStats, StatsSummary,
};

/// 默认初始化：JSON 日志，级别 `info` (或 `RUST_LOG`)，不启动指标导出。
pub fn init() -> Result<()> {
    init_with_config(&ObservabilityOptions::default())
}

/// 安装全局 subscriber；配置了端口时同时启动 Prometheus 导出。
///
/// 已存在全局 subscriber 时返回错误。
pub fn init_with_config(options: &ObservabilityOptions) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&options.log_level))
        .with_context(|| format!("Invalid log filter '{}'", options.log_level))?;

    tracing_subscriber::registry()
        .with(fmt_layer(options.log_format))
        .with(filter)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    if let Some(port) = options.metrics_port {
        init_metrics_only(port)?;
    }

    tracing::info!(
        log_format = ?options.log_format,
        metrics_port = ?options.metrics_port,
        "Observability initialized"
    );
    Ok(())
}

/// 仅初始化 Prometheus 导出 (宿主程序自行配置 tracing 时使用)
pub fn init_metrics_only(port: u16) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .with_context(|| format!("Failed to install Prometheus recorder on port {port}"))?;
    describe_metrics();

    tracing::info!(port, "Prometheus metrics endpoint initialized");
    Ok(())
}

fn fmt_layer(format: LogFormat) -> Box<dyn Layer<Registry> + Send + Sync> {
    match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_names(true)
            .with_current_span(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(false).boxed(),
    }
}
