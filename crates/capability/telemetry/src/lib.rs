//! 追踪、请求 ID 与轮询指标。

use serde::Serialize;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 请求级追踪标识。
#[derive(Debug, Clone)]
pub struct RequestIds {
    pub request_id: String,
    pub trace_id: String,
}

/// 指标快照。
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct MetricsSnapshot {
    pub cycles_started: u64,
    pub cycles_succeeded: u64,
    pub cycles_failed: u64,
    pub read_attempts: u64,
    pub read_retries: u64,
    pub read_timeouts: u64,
    pub ticks_dropped: u64,
    pub samples_good: u64,
    pub samples_error: u64,
    pub samples_simulated: u64,
    pub samples_stale: u64,
    pub decode_errors: u64,
    pub sink_timeouts: u64,
    pub degraded_entries: u64,
    pub watchdog_restarts: u64,
    pub batches_written: u64,
    pub pipeline_errors: u64,
    pub cycle_latency_ms_total: u64,
    pub cycle_latency_ms_count: u64,
}

/// 进程级轮询指标。
pub struct TelemetryMetrics {
    cycles_started: AtomicU64,
    cycles_succeeded: AtomicU64,
    cycles_failed: AtomicU64,
    read_attempts: AtomicU64,
    read_retries: AtomicU64,
    read_timeouts: AtomicU64,
    ticks_dropped: AtomicU64,
    samples_good: AtomicU64,
    samples_error: AtomicU64,
    samples_simulated: AtomicU64,
    samples_stale: AtomicU64,
    decode_errors: AtomicU64,
    sink_timeouts: AtomicU64,
    degraded_entries: AtomicU64,
    watchdog_restarts: AtomicU64,
    batches_written: AtomicU64,
    pipeline_errors: AtomicU64,
    cycle_latency_ms_total: AtomicU64,
    cycle_latency_ms_count: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            cycles_started: AtomicU64::new(0),
            cycles_succeeded: AtomicU64::new(0),
            cycles_failed: AtomicU64::new(0),
            read_attempts: AtomicU64::new(0),
            read_retries: AtomicU64::new(0),
            read_timeouts: AtomicU64::new(0),
            ticks_dropped: AtomicU64::new(0),
            samples_good: AtomicU64::new(0),
            samples_error: AtomicU64::new(0),
            samples_simulated: AtomicU64::new(0),
            samples_stale: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            sink_timeouts: AtomicU64::new(0),
            degraded_entries: AtomicU64::new(0),
            watchdog_restarts: AtomicU64::new(0),
            batches_written: AtomicU64::new(0),
            pipeline_errors: AtomicU64::new(0),
            cycle_latency_ms_total: AtomicU64::new(0),
            cycle_latency_ms_count: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            cycles_started: self.cycles_started.load(Ordering::Relaxed),
            cycles_succeeded: self.cycles_succeeded.load(Ordering::Relaxed),
            cycles_failed: self.cycles_failed.load(Ordering::Relaxed),
            read_attempts: self.read_attempts.load(Ordering::Relaxed),
            read_retries: self.read_retries.load(Ordering::Relaxed),
            read_timeouts: self.read_timeouts.load(Ordering::Relaxed),
            ticks_dropped: self.ticks_dropped.load(Ordering::Relaxed),
            samples_good: self.samples_good.load(Ordering::Relaxed),
            samples_error: self.samples_error.load(Ordering::Relaxed),
            samples_simulated: self.samples_simulated.load(Ordering::Relaxed),
            samples_stale: self.samples_stale.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            sink_timeouts: self.sink_timeouts.load(Ordering::Relaxed),
            degraded_entries: self.degraded_entries.load(Ordering::Relaxed),
            watchdog_restarts: self.watchdog_restarts.load(Ordering::Relaxed),
            batches_written: self.batches_written.load(Ordering::Relaxed),
            pipeline_errors: self.pipeline_errors.load(Ordering::Relaxed),
            cycle_latency_ms_total: self.cycle_latency_ms_total.load(Ordering::Relaxed),
            cycle_latency_ms_count: self.cycle_latency_ms_count.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局指标实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 生成新的 request_id 与 trace_id。
pub fn new_request_ids() -> RequestIds {
    RequestIds {
        request_id: uuid::Uuid::new_v4().to_string(),
        trace_id: uuid::Uuid::new_v4().to_string(),
    }
}

/// 记录轮询周期开始次数。
pub fn record_cycle_started() {
    metrics().cycles_started.fetch_add(1, Ordering::Relaxed);
}

/// 记录轮询周期成功次数（链路正常完成）。
pub fn record_cycle_succeeded() {
    metrics().cycles_succeeded.fetch_add(1, Ordering::Relaxed);
}

/// 记录轮询周期失败次数（重试耗尽）。
pub fn record_cycle_failed() {
    metrics().cycles_failed.fetch_add(1, Ordering::Relaxed);
}

/// 记录寄存器读取尝试次数（含重试）。
pub fn record_read_attempt() {
    metrics().read_attempts.fetch_add(1, Ordering::Relaxed);
}

/// 记录读取重试次数。
pub fn record_read_retry() {
    metrics().read_retries.fetch_add(1, Ordering::Relaxed);
}

/// 记录读取超时次数。
pub fn record_read_timeout() {
    metrics().read_timeouts.fetch_add(1, Ordering::Relaxed);
}

/// 记录因上一周期未结束而丢弃的 tick 次数。
pub fn record_tick_dropped() {
    metrics().ticks_dropped.fetch_add(1, Ordering::Relaxed);
}

/// 记录点位级解码/不支持操作错误次数。
pub fn record_decode_error() {
    metrics().decode_errors.fetch_add(1, Ordering::Relaxed);
}

/// 记录 Sample 交付超时次数。
pub fn record_sink_timeout() {
    metrics().sink_timeouts.fetch_add(1, Ordering::Relaxed);
}

/// 记录设备进入降级状态的次数。
pub fn record_degraded_entry() {
    metrics().degraded_entries.fetch_add(1, Ordering::Relaxed);
}

/// 记录看门狗强制重启 Worker 的次数。
pub fn record_watchdog_restart() {
    metrics().watchdog_restarts.fetch_add(1, Ordering::Relaxed);
}

/// 记录批量写出成功次数。
pub fn record_batch_written() {
    metrics().batches_written.fetch_add(1, Ordering::Relaxed);
}

/// 记录 Pipeline 写出失败次数（含背压）。
pub fn record_pipeline_error() {
    metrics().pipeline_errors.fetch_add(1, Ordering::Relaxed);
}

/// 按质量标记记录 Sample 输出（good / error / simulated / stale）。
pub fn record_sample(quality: &str) {
    let metrics = metrics();
    let counter = match quality {
        "good" => &metrics.samples_good,
        "simulated" => &metrics.samples_simulated,
        "stale" => &metrics.samples_stale,
        _ => &metrics.samples_error,
    };
    counter.fetch_add(1, Ordering::Relaxed);
}

/// 记录轮询周期耗时（毫秒）。
pub fn record_cycle_latency_ms(latency_ms: u64) {
    let metrics = metrics();
    metrics
        .cycle_latency_ms_total
        .fetch_add(latency_ms, Ordering::Relaxed);
    metrics
        .cycle_latency_ms_count
        .fetch_add(1, Ordering::Relaxed);
}
