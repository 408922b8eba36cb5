//! 轮询调度器
//!
//! 持有全部设备的 Worker 任务。设备的增删、改周期、重启都在同一把锁内
//! 完成，任一时刻每台设备恰好对应一个 Worker。

use crate::error::SchedulerError;
use crate::status::{DeviceStatus, StatusBoard};
use crate::worker::{PollWorker, WorkerConfig};
use domain::{DeviceConnection, FallbackPolicy, MAX_POLL_INTERVAL, MIN_POLL_INTERVAL, PointMap};
use ems_pipeline::SampleSink;
use ems_protocol::{ProtocolClient, create_client};
use ems_telemetry::record_watchdog_restart;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// 单台设备的调度定义。
#[derive(Debug, Clone)]
pub struct DeviceSpec {
    pub device_id: String,
    pub connection: DeviceConnection,
    pub poll_interval: Duration,
    /// 覆盖全局兜底策略
    pub fallback: Option<FallbackPolicy>,
    pub point_map: Arc<PointMap>,
}

/// 协议客户端工厂。
pub trait ClientFactory: Send + Sync {
    fn create(&self, spec: &DeviceSpec) -> Box<dyn ProtocolClient>;
}

/// 按设备传输类型创建真实客户端。
#[derive(Debug, Default, Clone)]
pub struct TransportFactory;

impl ClientFactory for TransportFactory {
    fn create(&self, spec: &DeviceSpec) -> Box<dyn ProtocolClient> {
        create_client(&spec.connection)
    }
}

/// 调度参数。
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub jitter: Duration,
    pub retry_backoff: Duration,
    pub degraded_threshold: u32,
    pub fallback: FallbackPolicy,
    pub sink_grace: Duration,
    pub watchdog_interval: Duration,
    /// 周期运行超过 interval + margin 视为卡死
    pub watchdog_margin: Duration,
    /// 停止 Worker 时等待当前周期结束的上限
    pub shutdown_grace: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            jitter: Duration::from_millis(5000),
            retry_backoff: Duration::from_millis(200),
            degraded_threshold: 3,
            fallback: FallbackPolicy::Simulated,
            sink_grace: Duration::from_millis(1000),
            watchdog_interval: Duration::from_millis(30_000),
            watchdog_margin: Duration::from_millis(10_000),
            shutdown_grace: Duration::from_millis(5000),
        }
    }
}

struct WorkerEntry {
    spec: DeviceSpec,
    stop: CancellationToken,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct SchedulerInner {
    config: SchedulerConfig,
    factory: Arc<dyn ClientFactory>,
    sink: Arc<dyn SampleSink>,
    status: StatusBoard,
    closed: CancellationToken,
    workers: Mutex<HashMap<String, WorkerEntry>>,
}

/// 轮询调度器（可克隆，共享同一组 Worker）。
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        factory: Arc<dyn ClientFactory>,
        sink: Arc<dyn SampleSink>,
    ) -> Self {
        let inner = SchedulerInner {
            config,
            factory,
            sink,
            status: StatusBoard::new(),
            closed: CancellationToken::new(),
            workers: Mutex::new(HashMap::new()),
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn status_board(&self) -> StatusBoard {
        self.inner.status.clone()
    }

    pub async fn status(&self) -> Vec<DeviceStatus> {
        self.inner.status.snapshot().await
    }

    pub async fn device_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.inner.workers.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn device_spec(&self, device_id: &str) -> Option<DeviceSpec> {
        self.inner
            .workers
            .lock()
            .await
            .get(device_id)
            .map(|entry| entry.spec.clone())
    }

    /// 添加设备并启动其 Worker。
    pub async fn add_device(&self, spec: DeviceSpec) -> Result<(), SchedulerError> {
        if self.inner.closed.is_cancelled() {
            return Err(SchedulerError::ShutDown);
        }
        validate_interval(&spec)?;
        let mut workers = self.inner.workers.lock().await;
        if workers.contains_key(&spec.device_id) {
            return Err(SchedulerError::DuplicateDevice(spec.device_id));
        }
        let device_id = spec.device_id.clone();
        let entry = self.spawn(spec).await;
        workers.insert(device_id.clone(), entry);
        info!(target: "ems.poller", device_id = %device_id, "device_added");
        Ok(())
    }

    /// 停止并移除设备；当前周期最多等待 `shutdown_grace`。
    pub async fn remove_device(&self, device_id: &str) -> Result<(), SchedulerError> {
        let mut workers = self.inner.workers.lock().await;
        let entry = workers
            .remove(device_id)
            .ok_or_else(|| SchedulerError::UnknownDevice(device_id.to_string()))?;
        self.stop_entry(entry).await;
        self.inner.status.remove(device_id).await;
        info!(target: "ems.poller", device_id = %device_id, "device_removed");
        Ok(())
    }

    /// 修改轮询间隔，替换为一个新的 Worker。
    pub async fn retime_device(
        &self,
        device_id: &str,
        poll_interval: Duration,
    ) -> Result<(), SchedulerError> {
        let mut workers = self.inner.workers.lock().await;
        let mut spec = workers
            .get(device_id)
            .map(|entry| entry.spec.clone())
            .ok_or_else(|| SchedulerError::UnknownDevice(device_id.to_string()))?;
        spec.poll_interval = poll_interval;
        validate_interval(&spec)?;

        if let Some(entry) = workers.remove(device_id) {
            self.stop_entry(entry).await;
        }
        let entry = self.spawn(spec).await;
        workers.insert(device_id.to_string(), entry);
        info!(
            target: "ems.poller",
            device_id = %device_id,
            interval_ms = poll_interval.as_millis() as u64,
            "device_retimed"
        );
        Ok(())
    }

    /// 立即取消设备的 Worker（含进行中的读取）并重新启动。
    pub async fn restart_device(&self, device_id: &str) -> Result<(), SchedulerError> {
        let mut workers = self.inner.workers.lock().await;
        let entry = workers
            .remove(device_id)
            .ok_or_else(|| SchedulerError::UnknownDevice(device_id.to_string()))?;
        let spec = entry.spec.clone();
        self.cancel_entry(entry).await;
        let entry = self.spawn(spec).await;
        workers.insert(device_id.to_string(), entry);
        self.inner
            .status
            .update(device_id, |status| status.restarts += 1)
            .await;
        Ok(())
    }

    /// 启动看门狗：周期运行超过 interval + margin，或 Worker 意外退出时重启。
    pub fn start_watchdog(&self) -> JoinHandle<()> {
        let scheduler = self.clone();
        let period = self.inner.config.watchdog_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // 第一次 tick 立即返回
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = scheduler.inner.closed.cancelled() => break,
                    _ = ticker.tick() => {
                        scheduler.sweep().await;
                    }
                }
            }
        })
    }

    /// 执行一次看门狗检查，返回重启的设备数。
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let statuses = self.inner.status.snapshot().await;
        let mut victims = Vec::new();
        {
            let workers = self.inner.workers.lock().await;
            for (device_id, entry) in workers.iter() {
                if entry.handle.is_finished() {
                    victims.push((device_id.clone(), "worker_exited", Duration::ZERO));
                    continue;
                }
                let limit = entry.spec.poll_interval + self.inner.config.watchdog_margin;
                let elapsed = statuses
                    .iter()
                    .find(|status| &status.device_id == device_id)
                    .and_then(|status| status.cycle_elapsed(now));
                if let Some(elapsed) = elapsed {
                    if elapsed > limit {
                        victims.push((device_id.clone(), "cycle_stuck", elapsed));
                    }
                }
            }
        }

        let mut restarted = 0;
        for (device_id, reason, elapsed) in victims {
            record_watchdog_restart();
            warn!(
                target: "ems.poller",
                device_id = %device_id,
                reason,
                elapsed_ms = elapsed.as_millis() as u64,
                "watchdog_restart"
            );
            if self.restart_device(&device_id).await.is_ok() {
                restarted += 1;
            }
        }
        restarted
    }

    /// 停机：通知全部 Worker 在当前周期后退出，超过宽限期的强制取消。
    pub async fn shutdown(&self) {
        self.inner.closed.cancel();
        let entries: Vec<_> = {
            let mut workers = self.inner.workers.lock().await;
            workers.drain().map(|(_, entry)| entry).collect()
        };
        for entry in &entries {
            entry.stop.cancel();
        }

        let deadline = Instant::now() + self.inner.config.shutdown_grace;
        let mut forced = 0;
        for mut entry in entries {
            if tokio::time::timeout_at(deadline, &mut entry.handle).await.is_err() {
                forced += 1;
                self.cancel_entry(entry).await;
            }
        }
        info!(target: "ems.poller", forced, "scheduler_stopped");
    }

    async fn spawn(&self, spec: DeviceSpec) -> WorkerEntry {
        let config = &self.inner.config;
        let client = self.inner.factory.create(&spec);
        self.inner
            .status
            .register(DeviceStatus::new(
                &spec.device_id,
                spec.point_map.device_type(),
                spec.connection.kind().as_str(),
                spec.poll_interval,
            ))
            .await;

        let worker_config = WorkerConfig {
            poll_interval: spec.poll_interval,
            jitter: config.jitter,
            read_timeout: Duration::from_millis(spec.connection.timeout_ms),
            retries: spec.connection.retries,
            retry_backoff: config.retry_backoff,
            degraded_threshold: config.degraded_threshold,
            fallback: spec.fallback.unwrap_or(config.fallback),
            sink_grace: config.sink_grace,
        };
        let worker = PollWorker::new(
            spec.device_id.clone(),
            client,
            Arc::clone(&spec.point_map),
            worker_config,
            Arc::clone(&self.inner.sink),
            self.inner.status.clone(),
        );
        let stop = CancellationToken::new();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(worker.run(stop.clone(), cancel.clone()));
        WorkerEntry {
            spec,
            stop,
            cancel,
            handle,
        }
    }

    /// 先等当前周期结束，超时后强制取消。
    async fn stop_entry(&self, mut entry: WorkerEntry) {
        entry.stop.cancel();
        if tokio::time::timeout(self.inner.config.shutdown_grace, &mut entry.handle)
            .await
            .is_err()
        {
            self.cancel_entry(entry).await;
        }
    }

    /// 立即取消；Worker 关闭连接后退出，仍未退出则中止任务。
    async fn cancel_entry(&self, mut entry: WorkerEntry) {
        entry.cancel.cancel();
        if tokio::time::timeout(self.inner.config.shutdown_grace, &mut entry.handle)
            .await
            .is_err()
        {
            entry.handle.abort();
            warn!(target: "ems.poller", device_id = %entry.spec.device_id, "worker_aborted");
        }
    }
}

/// 运行时增改设备与配置加载使用同一间隔范围。
fn validate_interval(spec: &DeviceSpec) -> Result<(), SchedulerError> {
    if !(MIN_POLL_INTERVAL..=MAX_POLL_INTERVAL).contains(&spec.poll_interval) {
        return Err(SchedulerError::InvalidInterval {
            device_id: spec.device_id.clone(),
            interval: spec.poll_interval,
        });
    }
    Ok(())
}
