//! 设备轮询状态看板
//!
//! Worker 写、状态接口与看门狗读。看板只是观测面，不参与 Worker 的
//! 轮询决策，PollState 仍由 Worker 独占。

use crate::state::Phase;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// 单台设备的状态快照。
#[derive(Debug, Clone, Serialize)]
pub struct DeviceStatus {
    pub device_id: String,
    pub device_type: String,
    pub transport: String,
    pub poll_interval_ms: u64,
    pub phase: Phase,
    pub degraded: bool,
    pub consecutive_failures: u32,
    pub last_success_ms: Option<i64>,
    pub cycles: u64,
    pub ticks_dropped: u64,
    pub restarts: u32,
    /// 当前周期开始时刻，空闲时为空
    #[serde(skip)]
    pub cycle_started: Option<Instant>,
}

impl DeviceStatus {
    pub fn new(
        device_id: &str,
        device_type: &str,
        transport: &str,
        poll_interval: Duration,
    ) -> Self {
        Self {
            device_id: device_id.to_string(),
            device_type: device_type.to_string(),
            transport: transport.to_string(),
            poll_interval_ms: poll_interval.as_millis() as u64,
            phase: Phase::Idle,
            degraded: false,
            consecutive_failures: 0,
            last_success_ms: None,
            cycles: 0,
            ticks_dropped: 0,
            restarts: 0,
            cycle_started: None,
        }
    }

    /// 当前周期已运行的时长。
    pub fn cycle_elapsed(&self, now: Instant) -> Option<Duration> {
        self.cycle_started.map(|started| now.saturating_duration_since(started))
    }
}

/// 共享状态看板。
#[derive(Debug, Clone, Default)]
pub struct StatusBoard {
    inner: Arc<RwLock<HashMap<String, DeviceStatus>>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册设备；已存在时保留计数器并更新静态信息。
    pub async fn register(&self, status: DeviceStatus) {
        let mut map = self.inner.write().await;
        match map.get_mut(&status.device_id) {
            Some(existing) => {
                existing.device_type = status.device_type;
                existing.transport = status.transport;
                existing.poll_interval_ms = status.poll_interval_ms;
                existing.phase = Phase::Idle;
                existing.cycle_started = None;
            }
            None => {
                map.insert(status.device_id.clone(), status);
            }
        }
    }

    pub async fn remove(&self, device_id: &str) {
        self.inner.write().await.remove(device_id);
    }

    pub async fn update<F>(&self, device_id: &str, f: F)
    where
        F: FnOnce(&mut DeviceStatus),
    {
        if let Some(status) = self.inner.write().await.get_mut(device_id) {
            f(status);
        }
    }

    pub async fn set_phase(&self, device_id: &str, phase: Phase) {
        self.update(device_id, |status| status.phase = phase).await;
    }

    pub async fn get(&self, device_id: &str) -> Option<DeviceStatus> {
        self.inner.read().await.get(device_id).cloned()
    }

    /// 按设备 ID 排序的全部状态。
    pub async fn snapshot(&self) -> Vec<DeviceStatus> {
        let mut all: Vec<_> = self.inner.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        all
    }
}
