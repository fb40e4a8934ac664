//! # Dispatcher
//!
//! 消息分发引擎。
//!
//! 负责：
//! - 提交 registration 时解析配置、按需校验 topic
//! - 每个 worker 独占一个 broker consumer，按 partition 顺序分发 record
//! - 根据 error handler 的决定跳过、停止或重试，并按提交策略提交 offset
//! - 优雅停机（drain + 超时强制中止）与状态查询

mod engine;
mod error;
mod handle;
mod metrics;
mod state;
mod worker;

pub use engine::DispatchEngine;
pub use error::DispatcherError;
pub use handle::{ListenerHandle, WorkerHandle};
pub use metrics::{WorkerMetrics, WorkerMetricsSnapshot};
pub use state::{LifecycleState, RegistrationStatus, WorkerPhase, WorkerStatus};
