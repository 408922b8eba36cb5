//! 轮询 Worker
//!
//! 每台设备一个 Worker，独占协议客户端与 PollState。周期内按点表顺序
//! 逐点读取，单点读取有超时和有限次重试；点位级错误（不支持的功能码、
//! 从站异常、解码失败）只影响该点位。链路重试耗尽后，剩余点位按兜底策略
//! 输出，本周期计为失败。

use crate::state::{Phase, PollState};
use crate::status::StatusBoard;
use crate::ticker::Ticker;
use domain::{
    FallbackPolicy, PointDefinition, PointMap, Quality, Sample, SampleValue, TransportKind,
    now_epoch_ms,
};
use ems_normalize::to_engineering;
use ems_pipeline::SampleSink;
use ems_protocol::{ProtocolClient, ProtocolError, decode, simulated_value};
use ems_telemetry::{
    record_cycle_failed, record_cycle_latency_ms, record_cycle_started, record_cycle_succeeded,
    record_decode_error, record_degraded_entry, record_read_attempt, record_read_retry,
    record_read_timeout, record_sample, record_sink_timeout, record_tick_dropped,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Worker 参数。
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub poll_interval: Duration,
    /// ± 抖动上限（会被限制在 interval/2 以内）
    pub jitter: Duration,
    /// 单次读超时
    pub read_timeout: Duration,
    /// 单次读的总尝试次数（至少 1）
    pub retries: u32,
    /// 首次重试前的退避，之后每次翻倍
    pub retry_backoff: Duration,
    /// 连续失败周期数达到该值进入降级
    pub degraded_threshold: u32,
    pub fallback: FallbackPolicy,
    /// 单个 Sample 交付的最长等待
    pub sink_grace: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            jitter: Duration::ZERO,
            read_timeout: Duration::from_millis(3000),
            retries: 3,
            retry_backoff: Duration::from_millis(200),
            degraded_threshold: 3,
            fallback: FallbackPolicy::Simulated,
            sink_grace: Duration::from_millis(1000),
        }
    }
}

/// 单个周期的结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// 链路正常，所有点位均已读取（点位级错误不计入）
    Completed,
    /// 链路重试耗尽
    Failed { degraded: bool },
}

/// 单台设备的轮询 Worker。
pub struct PollWorker {
    device_id: String,
    client: Box<dyn ProtocolClient>,
    point_map: Arc<PointMap>,
    config: WorkerConfig,
    state: PollState,
    sink: Arc<dyn SampleSink>,
    status: StatusBoard,
}

impl PollWorker {
    pub fn new(
        device_id: impl Into<String>,
        client: Box<dyn ProtocolClient>,
        point_map: Arc<PointMap>,
        config: WorkerConfig,
        sink: Arc<dyn SampleSink>,
        status: StatusBoard,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            client,
            point_map,
            config,
            state: PollState::default(),
            sink,
            status,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn state(&self) -> &PollState {
        &self.state
    }

    /// 运行轮询循环直到停止。
    ///
    /// - `stop`：当前周期结束后退出
    /// - `cancel`：立即放弃当前周期（含进行中的读取）并退出
    ///
    /// 两种方式退出前都会关闭协议客户端。
    pub async fn run(mut self, stop: CancellationToken, cancel: CancellationToken) {
        let mut ticker = Ticker::new(self.config.poll_interval, self.config.jitter);
        let status = self.status.clone();
        let device_id = self.device_id.clone();
        info!(
            target: "ems.poller",
            device_id = %device_id,
            device_type = %self.point_map.device_type(),
            transport = %self.client.kind(),
            interval_ms = self.config.poll_interval.as_millis() as u64,
            points = self.point_map.len(),
            "poll_worker_started"
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let deadline = ticker.next_fire();
            let cancelled = {
                let cycle = self.run_cycle(deadline);
                tokio::pin!(cycle);
                loop {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break true,
                        _ = &mut cycle => break false,
                        _ = ticker.tick() => {
                            // 上一周期未结束，本次 tick 丢弃而不排队
                            record_tick_dropped();
                            status.update(&device_id, |s| s.ticks_dropped += 1).await;
                            warn!(
                                target: "ems.poller",
                                device_id = %device_id,
                                "poll_tick_dropped",
                            );
                        }
                    }
                }
            };
            if cancelled {
                info!(target: "ems.poller", device_id = %device_id, "poll_cycle_cancelled");
                break;
            }
        }

        self.client.close().await;
        status
            .update(&device_id, |s| {
                s.phase = Phase::Idle;
                s.cycle_started = None;
            })
            .await;
        info!(target: "ems.poller", device_id = %device_id, "poll_worker_stopped");
    }

    /// 执行一个轮询周期，`deadline` 为下一次计划 tick，重试退避不会越过它。
    pub async fn run_cycle(&mut self, deadline: Instant) -> CycleOutcome {
        record_cycle_started();
        let started = Instant::now();
        let ts_ms = now_epoch_ms();
        self.status
            .update(&self.device_id, |s| {
                s.phase = Phase::Connecting;
                s.cycle_started = Some(started);
            })
            .await;

        // Reading（建连在首次读取内完成）
        self.status.set_phase(&self.device_id, Phase::Reading).await;
        let map = Arc::clone(&self.point_map);
        let mut reads = Vec::with_capacity(map.len());
        let mut link_failure = None;
        for (index, point) in map.points().enumerate() {
            match self.read_with_retry(point, deadline).await {
                Err(err) if err.is_transport() => {
                    link_failure = Some((index, err));
                    break;
                }
                other => reads.push((point, other)),
            }
        }

        // Decoding
        self.status.set_phase(&self.device_id, Phase::Decoding).await;
        let live_quality = match self.client.kind() {
            TransportKind::Simulated => Quality::Simulated,
            TransportKind::Tcp | TransportKind::Rtu => Quality::Good,
        };
        let mut samples = Vec::with_capacity(map.len());
        for (point, result) in reads {
            samples.push(self.point_sample(point, result, ts_ms, live_quality));
        }

        let outcome = match link_failure {
            None => {
                record_cycle_succeeded();
                if self.state.record_success(ts_ms) {
                    info!(target: "ems.poller", device_id = %self.device_id, "device_recovered");
                }
                CycleOutcome::Completed
            }
            Some((index, err)) => {
                record_cycle_failed();
                if self.state.record_failure(self.config.degraded_threshold) {
                    record_degraded_entry();
                    warn!(
                        target: "ems.poller",
                        device_id = %self.device_id,
                        failures = self.state.consecutive_failures,
                        fallback = ?self.config.fallback,
                        "device_degraded"
                    );
                }
                warn!(
                    target: "ems.poller",
                    device_id = %self.device_id,
                    error = %err,
                    failures = self.state.consecutive_failures,
                    "poll_cycle_failed"
                );
                let policy = if self.state.degraded {
                    self.config.fallback
                } else {
                    FallbackPolicy::Error
                };
                for point in map.points().skip(index) {
                    samples.push(self.fallback_sample(point, policy, ts_ms));
                }
                self.client.close().await;
                CycleOutcome::Failed {
                    degraded: self.state.degraded,
                }
            }
        };

        // Emitting
        self.status.set_phase(&self.device_id, Phase::Emitting).await;
        let emitted = samples.len();
        for sample in samples {
            emit_sample(self.sink.as_ref(), self.config.sink_grace, &self.device_id, sample).await;
        }

        self.state.cycles += 1;
        let elapsed = started.elapsed();
        record_cycle_latency_ms(elapsed.as_millis() as u64);
        let (cycles, degraded, failures, last_success) = (
            self.state.cycles,
            self.state.degraded,
            self.state.consecutive_failures,
            self.state.last_success_ms,
        );
        self.status
            .update(&self.device_id, |s| {
                s.phase = Phase::Idle;
                s.cycle_started = None;
                s.cycles = cycles;
                s.degraded = degraded;
                s.consecutive_failures = failures;
                s.last_success_ms = last_success;
            })
            .await;
        debug!(
            target: "ems.poller",
            device_id = %self.device_id,
            samples = emitted,
            elapsed_ms = elapsed.as_millis() as u64,
            outcome = ?outcome,
            "poll_cycle_completed"
        );
        outcome
    }

    /// 单点读取：最多 `retries` 次尝试，仅链路错误重试。
    async fn read_with_retry(
        &mut self,
        point: &PointDefinition,
        deadline: Instant,
    ) -> Result<Vec<u16>, ProtocolError> {
        let attempts = self.config.retries.max(1);
        let mut backoff = self.config.retry_backoff;
        let mut attempt = 1;
        loop {
            record_read_attempt();
            let read = self
                .client
                .read(point.function_code, point.address, point.register_count);
            let result = match tokio::time::timeout(self.config.read_timeout, read).await {
                Ok(result) => result,
                Err(_) => {
                    record_read_timeout();
                    Err(ProtocolError::Timeout(format!(
                        "read {} after {}ms",
                        point.name,
                        self.config.read_timeout.as_millis()
                    )))
                }
            };

            match result {
                Ok(words) => return Ok(words),
                Err(err) if !err.is_transport() || attempt >= attempts => return Err(err),
                Err(err) => {
                    // 退避不越过下一次计划 tick
                    let pause = backoff.min(deadline.saturating_duration_since(Instant::now()));
                    record_read_retry();
                    debug!(
                        target: "ems.poller",
                        device_id = %self.device_id,
                        point = %point.name,
                        attempt,
                        backoff_ms = pause.as_millis() as u64,
                        error = %err,
                        "read_retry"
                    );
                    tokio::time::sleep(pause).await;
                    backoff = backoff.saturating_mul(2);
                    attempt += 1;
                }
            }
        }
    }

    fn point_sample(
        &mut self,
        point: &PointDefinition,
        result: Result<Vec<u16>, ProtocolError>,
        ts_ms: i64,
        live_quality: Quality,
    ) -> Sample {
        if live_quality == Quality::Simulated && result.is_ok() {
            // 离线模式与降级兜底使用同一取值方式
            return self.fallback_sample(point, FallbackPolicy::Simulated, ts_ms);
        }

        let defaults = self.point_map.defaults();
        let byte_order = point.byte_order_or(defaults);
        let word_order = point.word_order_or(defaults);

        let decoded = result.map_err(|err| err.to_string()).and_then(|words| {
            decode(&words, point.data_type, byte_order, word_order).map_err(|err| err.to_string())
        });

        match decoded {
            Ok(value) => {
                let engineering = to_engineering(value, point);
                if let SampleValue::F64(v) = engineering.value {
                    if !v.is_finite() {
                        record_decode_error();
                        warn!(
                            target: "ems.poller",
                            device_id = %self.device_id,
                            point = %point.name,
                            "point_value_not_finite"
                        );
                        return self.sample(point, None, Quality::Error, ts_ms);
                    }
                }
                if !engineering.valid {
                    warn!(
                        target: "ems.poller",
                        device_id = %self.device_id,
                        point = %point.name,
                        value = %engineering.value,
                        "point_out_of_range"
                    );
                    return self.sample(point, Some(engineering.value), Quality::Error, ts_ms);
                }
                if live_quality == Quality::Good {
                    self.state.remember(&point.name, engineering.value);
                }
                self.sample(point, Some(engineering.value), live_quality, ts_ms)
            }
            Err(reason) => {
                record_decode_error();
                warn!(
                    target: "ems.poller",
                    device_id = %self.device_id,
                    point = %point.name,
                    error = %reason,
                    "point_read_failed"
                );
                self.sample(point, None, Quality::Error, ts_ms)
            }
        }
    }

    fn fallback_sample(
        &self,
        point: &PointDefinition,
        policy: FallbackPolicy,
        ts_ms: i64,
    ) -> Sample {
        let (value, quality) = match policy {
            FallbackPolicy::Error => (None, Quality::Error),
            FallbackPolicy::Simulated => match simulated_value(point) {
                Ok(value) => (Some(value), Quality::Simulated),
                Err(_) => (None, Quality::Error),
            },
            FallbackPolicy::HoldLast => match self.state.last_value(&point.name) {
                Some(value) => (Some(value), Quality::Stale),
                None => (None, Quality::Error),
            },
        };
        self.sample(point, value, quality, ts_ms)
    }

    fn sample(
        &self,
        point: &PointDefinition,
        value: Option<SampleValue>,
        quality: Quality,
        ts_ms: i64,
    ) -> Sample {
        Sample {
            device_id: self.device_id.clone(),
            point_name: point.name.clone(),
            ts_ms,
            value,
            unit: point.unit.clone(),
            quality,
        }
    }
}

/// 交付单个 Sample，最多等待 `grace`；失败只记录，不影响轮询。
async fn emit_sample(sink: &dyn SampleSink, grace: Duration, device_id: &str, sample: Sample) {
    record_sample(sample.quality.as_str());
    let point = sample.point_name.clone();
    match tokio::time::timeout(grace, sink.emit(sample)).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            record_sink_timeout();
            warn!(
                target: "ems.poller",
                device_id = %device_id,
                point = %point,
                error = %err,
                "sample_emit_failed"
            );
        }
        Err(_) => {
            record_sink_timeout();
            warn!(
                target: "ems.poller",
                device_id = %device_id,
                point = %point,
                "sample_emit_timeout",
            );
        }
    }
}
