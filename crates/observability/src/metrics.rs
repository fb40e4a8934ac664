//! Consumer 指标记录模块
//!
//! 通过 `metrics` facade 记录 dispatch engine 的运行指标；
//! 未安装 recorder 时所有调用都是空操作。

use contracts::Decision;
use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit,
};

/// 单条 record 的最终结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// handler 成功
    Processed,
    /// 失败后 error handler 决定跳过
    Skipped,
    /// 失败后 error handler 决定停止
    Stopped,
}

impl RecordOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Processed => "processed",
            Self::Skipped => "skipped",
            Self::Stopped => "stopped",
        }
    }
}

/// 注册所有 consumer 指标的说明（安装 recorder 之后调用）
pub fn describe_metrics() {
    describe_counter!("consumer_polls_total", Unit::Count, "Polls that returned records");
    describe_histogram!(
        "consumer_poll_batch_size",
        Unit::Count,
        "Records returned by one poll"
    );
    describe_counter!(
        "consumer_records_total",
        Unit::Count,
        "Records resolved, by outcome"
    );
    describe_counter!(
        "consumer_decisions_total",
        Unit::Count,
        "Error handler decisions"
    );
    describe_counter!("consumer_commits_total", Unit::Count, "Offset commit requests");
    describe_counter!(
        "consumer_committed_offsets_total",
        Unit::Count,
        "Partition offsets committed"
    );
    describe_histogram!(
        "consumer_handler_duration_ms",
        Unit::Milliseconds,
        "Message handler latency"
    );
    describe_gauge!("consumer_workers_active", Unit::Count, "Running workers");
    describe_counter!(
        "consumer_worker_failures_total",
        Unit::Count,
        "Workers that ended in the failed state"
    );
}

/// 记录一次 poll 的 batch 大小
pub fn record_poll_batch(registration: &str, size: usize) {
    counter!(
        "consumer_polls_total",
        "registration" => registration.to_string()
    )
    .increment(1);
    histogram!(
        "consumer_poll_batch_size",
        "registration" => registration.to_string()
    )
    .record(size as f64);
}

/// 记录 record 处理结果
pub fn record_record_outcome(registration: &str, topic: &str, outcome: RecordOutcome) {
    counter!(
        "consumer_records_total",
        "registration" => registration.to_string(),
        "topic" => topic.to_string(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// 记录 error handler 的决定
pub fn record_decision(registration: &str, decision: &Decision) {
    counter!(
        "consumer_decisions_total",
        "registration" => registration.to_string(),
        "decision" => decision.as_str()
    )
    .increment(1);
}

/// 记录 offset 提交
pub fn record_commit(registration: &str, offsets: usize, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "consumer_commits_total",
        "registration" => registration.to_string(),
        "status" => status
    )
    .increment(1);
    if success {
        counter!(
            "consumer_committed_offsets_total",
            "registration" => registration.to_string()
        )
        .increment(offsets as u64);
    }
}

/// 记录 handler 耗时
pub fn record_handler_duration_ms(registration: &str, millis: f64) {
    histogram!(
        "consumer_handler_duration_ms",
        "registration" => registration.to_string()
    )
    .record(millis);
}

/// worker 启动
pub fn record_worker_started(registration: &str) {
    gauge!(
        "consumer_workers_active",
        "registration" => registration.to_string()
    )
    .increment(1.0);
}

/// worker 退出（正常停止或失败）
pub fn record_worker_stopped(registration: &str, failed: bool) {
    gauge!(
        "consumer_workers_active",
        "registration" => registration.to_string()
    )
    .decrement(1.0);
    if failed {
        counter!(
            "consumer_worker_failures_total",
            "registration" => registration.to_string()
        )
        .increment(1);
    }
}

/// 统计摘要
#[derive(Debug, Clone, Copy, Default, PartialEq)]
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

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
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

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
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
        if self.count == 0 { 0.0 } else { self.mean }
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

    pub fn summary(&self) -> StatsSummary {
        StatsSummary::from(self)
    }
}
