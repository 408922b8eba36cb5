//! 设备配置文档
//!
//! ```yaml
//! devices:
//!   - id: pa-01
//!     point_map: rg20c
//!     poll_interval_s: 10
//!     connection: { kind: tcp, host: 192.168.1.100, port: 502 }
//! ```
//!
//! 每台设备单独校验，非法设备被剔除并逐条报告，其余设备照常加载。

use crate::ConfigError;
use domain::{DeviceConnection, FallbackPolicy, Transport};
pub use domain::{MAX_POLL_INTERVAL, MIN_POLL_INTERVAL};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

const DEFAULT_POLL_INTERVAL_S: f64 = 10.0;
const DEFAULT_TIMEOUT_MS: u64 = 3000;
const DEFAULT_RETRIES: u32 = 3;

/// 校验通过的设备配置。
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceConfig {
    pub id: String,
    /// 点表名（点表目录中的文件名主干）
    pub point_map: String,
    pub poll_interval: Duration,
    pub timeout_ms: u64,
    pub retries: u32,
    /// 未配置时使用点表的 unit_id
    pub unit_id: Option<u8>,
    pub fallback: Option<FallbackPolicy>,
    pub transport: Transport,
}

impl DeviceConfig {
    /// 组装连接参数。
    pub fn connection(&self, default_unit_id: u8) -> DeviceConnection {
        DeviceConnection {
            transport: self.transport.clone(),
            unit_id: self.unit_id.unwrap_or(default_unit_id),
            timeout_ms: self.timeout_ms,
            retries: self.retries,
        }
    }
}

/// 被剔除的设备。
#[derive(Debug)]
pub struct RejectedDevice {
    /// 文档中的 id（缺失时为 `#<序号>`）
    pub device_id: String,
    pub error: ConfigError,
}

/// 设备文档加载结果。
#[derive(Debug, Default)]
pub struct DevicesReport {
    pub devices: Vec<DeviceConfig>,
    /// enabled=false 的设备 id
    pub disabled: Vec<String>,
    pub rejected: Vec<RejectedDevice>,
}

#[derive(Debug, Deserialize)]
struct DevicesDocument {
    #[serde(default)]
    devices: Vec<serde_yaml::Value>,
}

#[derive(Debug, Deserialize)]
struct RawDevice {
    #[serde(default)]
    id: String,
    #[serde(alias = "device_type")]
    point_map: Option<String>,
    #[serde(default = "default_enabled")]
    enabled: bool,
    poll_interval_s: Option<f64>,
    timeout_ms: Option<u64>,
    retries: Option<u32>,
    unit_id: Option<u8>,
    fallback: Option<FallbackPolicy>,
    connection: Transport,
}

fn default_enabled() -> bool {
    true
}

/// 从文件加载设备配置（YAML，JSON 作为其子集同样可读）。
pub fn load_devices(path: impl AsRef<Path>) -> Result<DevicesReport, ConfigError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let report = parse_devices(&text)?;
    info!(
        target: "ems.config",
        path = %path.display(),
        devices = report.devices.len(),
        disabled = report.disabled.len(),
        rejected = report.rejected.len(),
        "devices_loaded"
    );
    Ok(report)
}

/// 解析设备配置文档。
///
/// 文档本身无法解析时返回错误；单台设备的问题记录在 `rejected` 中。
pub fn parse_devices(text: &str) -> Result<DevicesReport, ConfigError> {
    let document: DevicesDocument =
        serde_yaml::from_str(text).map_err(|err| ConfigError::Parse(err.to_string()))?;

    let mut report = DevicesReport::default();
    let mut seen = HashSet::new();
    for (index, value) in document.devices.into_iter().enumerate() {
        let label = value
            .get("id")
            .and_then(|id| id.as_str())
            .filter(|id| !id.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("#{}", index));

        let result = serde_yaml::from_value::<RawDevice>(value)
            .map_err(|err| device_error(&label, err.to_string()))
            .and_then(|raw| build_device(raw, &seen));
        match result {
            Ok(None) => {
                info!(target: "ems.config", device_id = %label, "device_disabled");
                report.disabled.push(label);
            }
            Ok(Some(device)) => {
                seen.insert(device.id.clone());
                report.devices.push(device);
            }
            Err(error) => {
                warn!(target: "ems.config", device_id = %label, error = %error, "device_rejected");
                report.rejected.push(RejectedDevice {
                    device_id: label,
                    error,
                });
            }
        }
    }
    Ok(report)
}

/// `Ok(None)` 表示设备被禁用。
fn build_device(
    raw: RawDevice,
    seen: &HashSet<String>,
) -> Result<Option<DeviceConfig>, ConfigError> {
    let id = raw.id.trim().to_string();
    if id.is_empty() {
        return Err(device_error("", "id must not be empty"));
    }
    if seen.contains(&id) {
        return Err(device_error(&id, "duplicate device id"));
    }
    if !raw.enabled {
        return Ok(None);
    }

    let point_map = raw
        .point_map
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| device_error(&id, "point_map is required"))?;

    let seconds = raw.poll_interval_s.unwrap_or(DEFAULT_POLL_INTERVAL_S);
    let poll_interval = Duration::try_from_secs_f64(seconds)
        .ok()
        .filter(|interval| (MIN_POLL_INTERVAL..=MAX_POLL_INTERVAL).contains(interval))
        .ok_or_else(|| {
            device_error(
                &id,
                format!(
                    "poll_interval_s {} is outside {}..={}s",
                    seconds,
                    MIN_POLL_INTERVAL.as_secs(),
                    MAX_POLL_INTERVAL.as_secs()
                ),
            )
        })?;

    let timeout_ms = raw.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS);
    if timeout_ms == 0 {
        return Err(device_error(&id, "timeout_ms must be positive"));
    }
    let retries = raw.retries.unwrap_or(DEFAULT_RETRIES);
    if retries == 0 {
        return Err(device_error(&id, "retries must be at least 1"));
    }
    if let Transport::Tcp { host, .. } = &raw.connection {
        if host.trim().is_empty() {
            return Err(device_error(&id, "tcp host must not be empty"));
        }
    }

    Ok(Some(DeviceConfig {
        id,
        point_map,
        poll_interval,
        timeout_ms,
        retries,
        unit_id: raw.unit_id,
        fallback: raw.fallback,
        transport: raw.connection,
    }))
}

fn device_error(device_id: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Device {
        device_id: device_id.to_string(),
        reason: reason.into(),
    }
}
