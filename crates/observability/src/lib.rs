//! # Observability
//!
//! 可观测性模块：Tracing + Prometheus 指标。
//!
//! ## 功能
//!
//! - Tracing 初始化 (JSON/Pretty/Compact 格式)
//! - Prometheus 指标导出，并注册 consumer 指标的说明
//! - Consumer 指标记录（poll / record / decision / commit）
//!
//! ## 使用示例
//!
//! ```ignore
//! use observability::metrics;
//!
//! // 初始化
//! observability::init()?;
//!
//! // 记录一次 poll
//! metrics::record_poll_batch("orders-listener", records.len());
//! ```

pub mod metrics;

use std::net::SocketAddr;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

// Re-exports
pub use crate::metrics::{
    describe_metrics, record_commit, record_decision, record_handler_duration_ms,
    record_poll_batch, record_record_outcome, record_worker_started, record_worker_stopped,
    RecordOutcome, RunningStats, StatsSummary,
};

/// 初始化可观测性（Tracing + Prometheus）
///
/// - Tracing: JSON 格式，支持 RUST_LOG 环境变量
/// - Prometheus: 监听 0.0.0.0:9000
pub fn init() -> Result<()> {
    init_with_config(ObservabilityConfig::default())
}

/// 可观测性配置
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// 日志格式
    pub log_format: LogFormat,
    /// Prometheus 监听地址 (None = 禁用)
    pub metrics_addr: Option<SocketAddr>,
    /// RUST_LOG 未设置时使用的过滤规则
    pub default_log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Json,
            metrics_addr: Some(SocketAddr::from(([0, 0, 0, 0], 9000))),
            // librdkafka 的日志非常多
            default_log_level: "info,rdkafka=warn".to_string(),
        }
    }
}

/// 日志格式
#[derive(Debug, Clone, Copy, Default)]
pub enum LogFormat {
    /// JSON 结构化日志
    #[default]
    Json,
    /// 人类可读格式
    Pretty,
    /// 紧凑单行格式
    Compact,
}

/// 使用自定义配置初始化
pub fn init_with_config(config: ObservabilityConfig) -> Result<()> {
    init_tracing(config.log_format, &config.default_log_level)?;

    if let Some(addr) = config.metrics_addr {
        init_metrics(addr)?;
    }

    tracing::info!(
        log_format = ?config.log_format,
        metrics_addr = ?config.metrics_addr,
        "Observability initialized"
    );

    Ok(())
}

/// 仅初始化 Prometheus 指标（不初始化 Tracing）
///
/// 用于 Tracing 已由其他模块初始化的场景。
pub fn init_metrics_only(port: u16) -> Result<()> {
    init_metrics(SocketAddr::from(([0, 0, 0, 0], port)))
}

fn init_tracing(format: LogFormat, default_level: &str) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let fmt_layer = match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
        LogFormat::Compact => fmt::layer().compact().boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .context("Failed to initialize tracing subscriber")
}

fn init_metrics(addr: SocketAddr) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus recorder")?;
    describe_metrics();

    tracing::info!(%addr, "Prometheus metrics endpoint initialized");
    Ok(())
}
