//! 采集链路装配模块
//!
//! 点表目录 + 设备配置 → 每台设备一个 DeviceSpec → 调度器。
//! Worker 产出的 Sample 经有界通道交给消费任务，批量写出到 [`LogSampleWriter`]。

use crate::writer::LogSampleWriter;
use domain::PointMap;
use ems_config::{AppConfig, DeviceConfig, load_devices};
use ems_pipeline::{Pipeline, PipelineConfig, run_consumer, sample_channel};
use ems_pointmap::{LoadOptions, PointMapRegistry};
use ems_poller::{DeviceSpec, Scheduler, SchedulerConfig, TransportFactory};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const FLUSH_EVERY: Duration = Duration::from_secs(1);

/// 运行中的采集链路。
pub struct Collector {
    scheduler: Scheduler,
    consumer: JoinHandle<()>,
    watchdog: JoinHandle<()>,
    cancel: CancellationToken,
}

impl Collector {
    pub fn scheduler(&self) -> Scheduler {
        self.scheduler.clone()
    }

    /// 先停 Worker（产出最后一批 Sample），再排空通道并 flush。
    pub async fn shutdown(self) {
        self.scheduler.shutdown().await;
        self.cancel.cancel();
        if let Err(err) = self.consumer.await {
            warn!(target: "ems.collector", error = %err, "sample_consumer_join_failed");
        }
        if let Err(err) = self.watchdog.await {
            warn!(target: "ems.collector", error = %err, "watchdog_join_failed");
        }
        info!(target: "ems.collector", "collector_stopped");
    }
}

/// 被排除的设备及原因。
#[derive(Debug)]
pub struct ExcludedDevice {
    pub device_id: String,
    pub reason: String,
}

/// 启动采集链路。
pub async fn start(config: &AppConfig) -> Result<Collector, Box<dyn std::error::Error>> {
    let options = LoadOptions {
        duplicate_policy: config.duplicate_points,
        ..LoadOptions::default()
    };
    let (registry, issues) = PointMapRegistry::load_dir(&config.pointmap_dir, &options)?;
    let report = load_devices(&config.devices_file)?;
    let (specs, excluded) = device_specs(report.devices, &registry);
    info!(
        target: "ems.collector",
        point_maps = registry.len(),
        point_map_issues = issues.len(),
        devices = specs.len(),
        excluded = excluded.len() + report.rejected.len(),
        disabled = report.disabled.len(),
        "collector_configured"
    );
    if specs.is_empty() {
        warn!(target: "ems.collector", "no_devices_configured");
    }

    let (sink, rx) =
        sample_channel(config.sink_capacity, Duration::from_millis(config.sink_grace_ms));
    let pipeline = Pipeline::with_config(
        Arc::new(LogSampleWriter),
        PipelineConfig {
            batch_size: config.pipeline_batch_size,
            max_buffer_size: config.pipeline_batch_size.saturating_mul(10),
            ..PipelineConfig::default()
        },
    );
    let cancel = CancellationToken::new();
    let consumer = tokio::spawn(run_consumer(rx, pipeline, FLUSH_EVERY, cancel.clone()));

    let scheduler = Scheduler::new(
        scheduler_config(config),
        Arc::new(TransportFactory),
        Arc::new(sink),
    );
    for spec in specs {
        let device_id = spec.device_id.clone();
        if let Err(err) = scheduler.add_device(spec).await {
            warn!(
                target: "ems.collector",
                device_id = %device_id,
                error = %err,
                "device_add_failed",
            );
        }
    }
    let watchdog = scheduler.start_watchdog();

    Ok(Collector {
        scheduler,
        consumer,
        watchdog,
        cancel,
    })
}

/// 将设备配置与点表关联；引用未知点表的设备被排除。
pub fn device_specs(
    devices: Vec<DeviceConfig>,
    registry: &PointMapRegistry,
) -> (Vec<DeviceSpec>, Vec<ExcludedDevice>) {
    let mut specs = Vec::with_capacity(devices.len());
    let mut excluded = Vec::new();
    for device in devices {
        let Some(point_map) = registry.get(&device.point_map) else {
            let exclusion = ExcludedDevice {
                reason: format!("point map {} not loaded", device.point_map),
                device_id: device.id,
            };
            warn!(
                target: "ems.collector",
                device_id = %exclusion.device_id,
                reason = %exclusion.reason,
                "device_excluded"
            );
            excluded.push(exclusion);
            continue;
        };
        specs.push(spec_for(device, point_map));
    }
    (specs, excluded)
}

fn spec_for(device: DeviceConfig, point_map: Arc<PointMap>) -> DeviceSpec {
    let connection = device.connection(point_map.defaults().unit_id);
    DeviceSpec {
        device_id: device.id,
        connection,
        poll_interval: device.poll_interval,
        fallback: device.fallback,
        point_map,
    }
}

fn scheduler_config(config: &AppConfig) -> SchedulerConfig {
    SchedulerConfig {
        jitter: Duration::from_millis(config.scheduler_jitter_ms),
        retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        degraded_threshold: config.degraded_threshold,
        fallback: config.fallback_policy,
        sink_grace: Duration::from_millis(config.sink_grace_ms),
        watchdog_interval: Duration::from_millis(config.watchdog_interval_ms),
        watchdog_margin: Duration::from_millis(config.watchdog_margin_ms),
        shutdown_grace: Duration::from_millis(config.shutdown_grace_ms),
    }
}
