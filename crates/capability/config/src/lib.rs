//! 应用运行配置加载。
//!
//! - [`AppConfig`]：`EMS_*` 环境变量
//! - [`devices`]：设备配置文档（YAML）

pub mod devices;

pub use devices::{
    DeviceConfig, DevicesReport, MAX_POLL_INTERVAL, MIN_POLL_INTERVAL, RejectedDevice, load_devices,
    parse_devices,
};

use domain::{DuplicatePolicy, FallbackPolicy};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
    #[error("read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse devices document: {0}")]
    Parse(String),
    #[error("device {device_id}: {reason}")]
    Device { device_id: String, reason: String },
}

/// 应用运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub devices_file: PathBuf,
    pub pointmap_dir: PathBuf,
    pub http_addr: String,
    pub scheduler_jitter_ms: u64,
    pub watchdog_interval_ms: u64,
    pub watchdog_margin_ms: u64,
    pub shutdown_grace_ms: u64,
    pub sink_grace_ms: u64,
    pub sink_capacity: usize,
    pub retry_backoff_ms: u64,
    pub degraded_threshold: u32,
    pub fallback_policy: FallbackPolicy,
    pub duplicate_points: DuplicatePolicy,
    pub pipeline_batch_size: usize,
}

impl AppConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        let devices_file = env::var("EMS_DEVICES_FILE")
            .map(PathBuf::from)
            .map_err(|_| ConfigError::Missing("EMS_DEVICES_FILE".to_string()))?;
        let pointmap_dir = env::var("EMS_POINTMAP_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("pointmaps"));
        let http_addr = env::var("EMS_HTTP_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
        let scheduler_jitter_ms = read_with_default("EMS_SCHEDULER_JITTER_MS", 5000)?;
        let watchdog_interval_ms = read_positive("EMS_WATCHDOG_INTERVAL_MS", 30_000)?;
        let watchdog_margin_ms = read_with_default("EMS_WATCHDOG_MARGIN_MS", 10_000)?;
        let shutdown_grace_ms = read_with_default("EMS_SHUTDOWN_GRACE_MS", 5000)?;
        let sink_grace_ms = read_positive("EMS_SINK_GRACE_MS", 1000)?;
        let sink_capacity = read_positive("EMS_SINK_CAPACITY", 1024)?;
        let retry_backoff_ms = read_with_default("EMS_RETRY_BACKOFF_MS", 200)?;
        let degraded_threshold = read_positive("EMS_DEGRADED_THRESHOLD", 3)?;
        let fallback_policy = read_with_default("EMS_FALLBACK_POLICY", FallbackPolicy::Simulated)?;
        let duplicate_points = read_with_default("EMS_DUPLICATE_POINTS", DuplicatePolicy::Reject)?;
        let pipeline_batch_size = read_positive("EMS_PIPELINE_BATCH_SIZE", 100)?;

        Ok(Self {
            devices_file,
            pointmap_dir,
            http_addr,
            scheduler_jitter_ms,
            watchdog_interval_ms,
            watchdog_margin_ms,
            shutdown_grace_ms,
            sink_grace_ms,
            sink_capacity,
            retry_backoff_ms,
            degraded_threshold,
            fallback_policy,
            duplicate_points,
            pipeline_batch_size,
        })
    }
}

/// 读取可解析的环境变量，未设置或为空时取默认值。
fn read_with_default<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    let value = match env::var(key) {
        Ok(value) if !value.trim().is_empty() => value,
        _ => return Ok(default),
    };
    value
        .trim()
        .parse::<T>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

/// 同上，但要求大于零。
fn read_positive<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Default + ToString,
{
    let value = read_with_default(key, default)?;
    if value <= T::default() {
        return Err(ConfigError::Invalid(key.to_string(), value.to_string()));
    }
    Ok(value)
}
