//! 点表文档解析与校验
//!
//! ## 文档格式
//!
//! ```yaml
//! device_info:
//!   type: power_analyzer
//!   protocol: modbus_tcp
//!   description: RG20C Power Analyzer
//! modbus_settings:
//!   byte_order: big_endian
//!   word_order: big_endian
//!   unit_id: 1
//! points:
//!   Voltage_L1:
//!     address: 0
//!     function_code: 3
//!     data_type: float32
//!     register_count: 2   # 也接受 byte_count
//!     scale: 1
//!     offset: 0
//!     unit: V
//!     min_value: 0
//!     max_value: 1000
//! ```

use crate::error::PointMapError;
use domain::{
    ByteOrder, DataType, DeviceInfo, DuplicatePolicy, PointDefinition, PointMap,
    TransportDefaults, WordOrder,
};
use ems_normalize::normalize_unit;
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use tracing::warn;

/// 文档格式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Yaml,
    Json,
}

impl DocumentFormat {
    /// 按扩展名识别。
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Some(Self::Yaml),
            Some("json") => Some(Self::Json),
            _ => None,
        }
    }
}

/// 加载选项。
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub duplicate_policy: DuplicatePolicy,
    /// 是否做单位归一化（mA → A 等）
    pub normalize_units: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            duplicate_policy: DuplicatePolicy::Reject,
            normalize_units: true,
        }
    }
}

/// 加载结果：点表 + 被剔除点位的错误。
#[derive(Debug)]
pub struct LoadedPointMap {
    pub map: PointMap,
    pub rejected: Vec<PointMapError>,
}

#[derive(Debug, Deserialize)]
struct PointMapDocument {
    #[serde(default)]
    device_info: DeviceInfo,
    #[serde(default, alias = "transport_settings")]
    modbus_settings: TransportDefaults,
    points: RawPoints,
}

/// 保留文档顺序与重复键的点位条目。
#[derive(Debug)]
struct RawPoints(Vec<(String, RawPoint)>);

impl<'de> Deserialize<'de> for RawPoints {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = RawPoints;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping of point name to point definition")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, point)) = access.next_entry::<String, RawPoint>()? {
                    entries.push((name, point));
                }
                Ok(RawPoints(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

#[derive(Debug, Deserialize)]
struct RawPoint {
    address: Option<i64>,
    function_code: Option<i64>,
    #[serde(alias = "byte_count")]
    register_count: Option<i64>,
    data_type: Option<String>,
    scale: Option<f64>,
    offset: Option<f64>,
    unit: Option<String>,
    description: Option<String>,
    min_value: Option<f64>,
    max_value: Option<f64>,
    #[serde(default = "default_read_only")]
    read_only: bool,
    byte_order: Option<ByteOrder>,
    word_order: Option<WordOrder>,
}

fn default_read_only() -> bool {
    true
}

/// 从文件加载点表，设备类型取文件名（不含扩展名）。
pub fn load_point_map(path: &Path, options: &LoadOptions) -> Result<LoadedPointMap, PointMapError> {
    let format = DocumentFormat::from_path(path)
        .ok_or_else(|| PointMapError::UnsupportedFormat(path.to_path_buf()))?;
    let device_type = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or_default()
        .to_string();
    let text = std::fs::read_to_string(path).map_err(|source| PointMapError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_point_map(&device_type, &text, format, options)
}

/// 解析点表文档文本。
pub fn parse_point_map(
    device_type: &str,
    text: &str,
    format: DocumentFormat,
    options: &LoadOptions,
) -> Result<LoadedPointMap, PointMapError> {
    let document: PointMapDocument = match format {
        DocumentFormat::Yaml => serde_yaml::from_str(text).map_err(|e| PointMapError::Parse {
            device_type: device_type.to_string(),
            message: e.to_string(),
        })?,
        DocumentFormat::Json => serde_json::from_str(text).map_err(|e| PointMapError::Parse {
            device_type: device_type.to_string(),
            message: e.to_string(),
        })?,
    };

    let mut points = Vec::with_capacity(document.points.0.len());
    let mut rejected = Vec::new();
    for (name, raw) in document.points.0 {
        match build_point(name, raw, options) {
            Ok(point) => points.push(point),
            Err(err) => rejected.push(err),
        }
    }

    let mut loaded = assemble(
        device_type,
        document.device_info,
        document.modbus_settings,
        points,
        options.duplicate_policy,
    )?;
    rejected.append(&mut loaded.rejected);
    loaded.rejected = rejected;

    for err in &loaded.rejected {
        warn!(target: "ems.pointmap", device_type = %device_type, error = %err, "point_rejected");
    }
    Ok(loaded)
}

/// 按重复策略组装点表。
pub fn assemble(
    device_type: &str,
    info: DeviceInfo,
    defaults: TransportDefaults,
    points: Vec<PointDefinition>,
    duplicate_policy: DuplicatePolicy,
) -> Result<LoadedPointMap, PointMapError> {
    let declared: HashSet<String> = points.iter().map(|point| point.name.clone()).collect();
    let mut seen = HashSet::with_capacity(points.len());
    let mut accepted = Vec::with_capacity(points.len());
    let mut rejected = Vec::new();

    for mut point in points {
        if seen.contains(&point.name) {
            match duplicate_policy {
                DuplicatePolicy::Reject => {
                    rejected.push(PointMapError::DuplicatePoint(point.name));
                    continue;
                }
                DuplicatePolicy::Uniquify => {
                    let mut suffix = 2;
                    let renamed = loop {
                        let candidate = format!("{}_{}", point.name, suffix);
                        if !seen.contains(&candidate) && !declared.contains(&candidate) {
                            break candidate;
                        }
                        suffix += 1;
                    };
                    warn!(
                        target: "ems.pointmap",
                        device_type = %device_type,
                        point = %point.name,
                        renamed = %renamed,
                        "duplicate_point_renamed"
                    );
                    point.name = renamed;
                }
            }
        }
        seen.insert(point.name.clone());
        accepted.push(point);
    }

    if accepted.is_empty() {
        return Err(PointMapError::Empty(device_type.to_string()));
    }

    let map = PointMap::new(device_type, info, defaults, accepted)
        .map_err(|err| PointMapError::DuplicatePoint(err.0))?;
    Ok(LoadedPointMap { map, rejected })
}

fn build_point(
    name: String,
    raw: RawPoint,
    options: &LoadOptions,
) -> Result<PointDefinition, PointMapError> {
    let address = raw.address.ok_or_else(|| PointMapError::MissingField {
        point: name.clone(),
        field: "address",
    })?;
    let address = u16::try_from(address).map_err(|_| PointMapError::InvalidField {
        point: name.clone(),
        field: "address",
        reason: format!("{} is outside 0..=65535", address),
    })?;

    let function_code = raw.function_code.ok_or_else(|| PointMapError::MissingField {
        point: name.clone(),
        field: "function_code",
    })?;
    let function_code = u8::try_from(function_code).map_err(|_| PointMapError::InvalidField {
        point: name.clone(),
        field: "function_code",
        reason: format!("{} is outside 0..=255", function_code),
    })?;

    let data_type_name = raw.data_type.ok_or_else(|| PointMapError::MissingField {
        point: name.clone(),
        field: "data_type",
    })?;
    let data_type =
        DataType::parse(&data_type_name).ok_or_else(|| PointMapError::UnsupportedDataType {
            point: name.clone(),
            value: data_type_name.clone(),
        })?;

    let register_count = match raw.register_count {
        None => data_type.word_width(),
        Some(count) if count <= 0 => {
            return Err(PointMapError::InvalidRegisterCount { point: name, count });
        }
        Some(count) => u16::try_from(count).map_err(|_| PointMapError::InvalidField {
            point: name.clone(),
            field: "register_count",
            reason: format!("{} is too large", count),
        })?,
    };
    if register_count != data_type.word_width() {
        return Err(PointMapError::WidthMismatch {
            point: name,
            data_type: data_type.to_string(),
            expected: data_type.word_width(),
            actual: register_count,
        });
    }
    if u32::from(address) + u32::from(register_count) > 0x1_0000 {
        return Err(PointMapError::InvalidField {
            point: name,
            field: "address",
            reason: "register range runs past 65535".to_string(),
        });
    }

    let scale = raw.scale.unwrap_or(1.0);
    let offset = raw.offset.unwrap_or(0.0);
    if !scale.is_finite() || !offset.is_finite() {
        return Err(PointMapError::InvalidField {
            point: name,
            field: "scale",
            reason: "scale and offset must be finite".to_string(),
        });
    }
    if let (Some(min), Some(max)) = (raw.min_value, raw.max_value) {
        if min > max {
            return Err(PointMapError::InvalidField {
                point: name,
                field: "min_value",
                reason: format!("min_value {} exceeds max_value {}", min, max),
            });
        }
    }

    let source_unit = raw.unit.unwrap_or_default();
    let (unit, unit_factor) = if options.normalize_units {
        let conversion = normalize_unit(&source_unit);
        (conversion.unit, conversion.factor)
    } else if source_unit.trim().is_empty() {
        ("none".to_string(), 1.0)
    } else {
        (source_unit.trim().to_string(), 1.0)
    };

    Ok(PointDefinition {
        name,
        address,
        function_code,
        register_count,
        data_type,
        scale,
        unit_factor,
        offset,
        unit,
        source_unit,
        description: raw.description,
        min_value: raw.min_value,
        max_value: raw.max_value,
        read_only: raw.read_only,
        byte_order: raw.byte_order,
        word_order: raw.word_order,
    })
}
