//! 点表模型。
//!
//! 点表（PointMap）描述一类设备的寄存器布局，加载后只读，
//! 同一设备类型的所有 Worker 通过 `Arc<PointMap>` 共享。

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Modbus 功能码（仅读操作）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FunctionCode {
    /// 读线圈状态 (0x01)
    ReadCoils = 1,
    /// 读离散输入 (0x02)
    ReadDiscreteInputs = 2,
    /// 读保持寄存器 (0x03)
    ReadHoldingRegisters = 3,
    /// 读输入寄存器 (0x04)
    ReadInputRegisters = 4,
}

impl FunctionCode {
    pub fn code(self) -> u8 {
        self as u8
    }

    /// 线圈/离散输入按位读取。
    pub fn is_bit_access(self) -> bool {
        matches!(self, Self::ReadCoils | Self::ReadDiscreteInputs)
    }
}

impl TryFrom<u8> for FunctionCode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::ReadCoils),
            2 => Ok(Self::ReadDiscreteInputs),
            3 => Ok(Self::ReadHoldingRegisters),
            4 => Ok(Self::ReadInputRegisters),
            other => Err(other),
        }
    }
}

/// 寄存器数据类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// 非零即 true
    #[serde(alias = "bool")]
    Boolean,
    /// 原始 16 位值，由消费方自行取位
    #[serde(alias = "bitfield", alias = "bit")]
    Bitfield16,
    Int16,
    Uint16,
    Int32,
    Uint32,
    #[serde(alias = "float")]
    Float32,
    #[serde(alias = "double")]
    Float64,
}

impl DataType {
    /// 该类型占用的寄存器（16 位字）数量。
    pub fn word_width(self) -> u16 {
        match self {
            Self::Boolean | Self::Bitfield16 | Self::Int16 | Self::Uint16 => 1,
            Self::Int32 | Self::Uint32 | Self::Float32 => 2,
            Self::Float64 => 4,
        }
    }

    /// 是否参与 scale/offset 换算。
    pub fn is_numeric(self) -> bool {
        !matches!(self, Self::Boolean | Self::Bitfield16)
    }

    /// 解析文档中的类型名（含常见别名）。
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "boolean" | "bool" => Some(Self::Boolean),
            "bitfield16" | "bitfield" | "bit" => Some(Self::Bitfield16),
            "int16" | "int" => Some(Self::Int16),
            "uint16" | "uint" => Some(Self::Uint16),
            "int32" | "long" => Some(Self::Int32),
            "uint32" | "ulong" => Some(Self::Uint32),
            "float32" | "float" => Some(Self::Float32),
            "float64" | "double" => Some(Self::Float64),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Bitfield16 => "bitfield16",
            Self::Int16 => "int16",
            Self::Uint16 => "uint16",
            Self::Int32 => "int32",
            Self::Uint32 => "uint32",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 字内字节序：每个 16 位字的两个字节是否交换。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ByteOrder {
    /// 高字节在前（AB）
    #[default]
    #[serde(alias = "big_endian", alias = "be")]
    Big,
    /// 低字节在前（BA）
    #[serde(alias = "little_endian", alias = "le")]
    Little,
}

/// 字序：多寄存器值中最高有效字在前还是在后。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WordOrder {
    /// 最高有效字在前（AB CD）
    #[default]
    #[serde(alias = "big_endian", alias = "be")]
    Big,
    /// 最高有效字在后（CD AB）
    #[serde(alias = "little_endian", alias = "le")]
    Little,
}

/// 单个点位定义。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointDefinition {
    /// 点名（点表内唯一）
    pub name: String,
    /// 寄存器起始地址
    pub address: u16,
    /// 功能码原值；未知功能码在轮询时按点隔离报错
    pub function_code: u8,
    /// 占用寄存器数量
    pub register_count: u16,
    pub data_type: DataType,
    /// 设备侧缩放系数
    pub scale: f64,
    /// 单位换算系数（如 mA → A 为 0.001），与 `scale` 分开保存
    pub unit_factor: f64,
    /// 偏移量（目标单位下，scale 之后叠加）
    pub offset: f64,
    /// 归一化后的工程单位
    pub unit: String,
    /// 文档中的原始单位
    pub source_unit: String,
    pub description: Option<String>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub read_only: bool,
    /// 覆盖点表默认字节序
    pub byte_order: Option<ByteOrder>,
    /// 覆盖点表默认字序
    pub word_order: Option<WordOrder>,
}

impl PointDefinition {
    /// 最小定义：scale=1、offset=0、无单位、只读。
    pub fn new(
        name: impl Into<String>,
        address: u16,
        function_code: u8,
        data_type: DataType,
    ) -> Self {
        Self {
            name: name.into(),
            address,
            function_code,
            register_count: data_type.word_width(),
            data_type,
            scale: 1.0,
            unit_factor: 1.0,
            offset: 0.0,
            unit: "none".to_string(),
            source_unit: String::new(),
            description: None,
            min_value: None,
            max_value: None,
            read_only: true,
            byte_order: None,
            word_order: None,
        }
    }

    /// 实际乘到原始值上的系数（设备缩放 × 单位换算）。
    pub fn effective_scale(&self) -> f64 {
        self.scale * self.unit_factor
    }

    /// register_count 与数据类型字宽是否一致。
    pub fn width_matches(&self) -> bool {
        self.register_count == self.data_type.word_width()
    }

    pub fn byte_order_or(&self, defaults: &TransportDefaults) -> ByteOrder {
        self.byte_order.unwrap_or(defaults.byte_order)
    }

    pub fn word_order_or(&self, defaults: &TransportDefaults) -> WordOrder {
        self.word_order.unwrap_or(defaults.word_order)
    }
}

/// 设备类型元数据。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    #[serde(rename = "type", default)]
    pub device_type: String,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: Option<String>,
}

/// 点表级默认传输参数（文档中的 `modbus_settings`）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportDefaults {
    #[serde(default)]
    pub byte_order: ByteOrder,
    #[serde(default)]
    pub word_order: WordOrder,
    #[serde(default = "default_unit_id")]
    pub unit_id: u8,
}

impl Default for TransportDefaults {
    fn default() -> Self {
        Self {
            byte_order: ByteOrder::Big,
            word_order: WordOrder::Big,
            unit_id: default_unit_id(),
        }
    }
}

fn default_unit_id() -> u8 {
    1
}

/// 点名重复。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("duplicate point name: {0}")]
pub struct DuplicatePointName(pub String);

/// 一类设备的寄存器目录。
#[derive(Debug, Clone, PartialEq)]
pub struct PointMap {
    device_type: String,
    info: DeviceInfo,
    defaults: TransportDefaults,
    points: Vec<PointDefinition>,
    index: HashMap<String, usize>,
}

impl PointMap {
    /// 构建点表，点名必须唯一。
    pub fn new(
        device_type: impl Into<String>,
        info: DeviceInfo,
        defaults: TransportDefaults,
        points: Vec<PointDefinition>,
    ) -> Result<Self, DuplicatePointName> {
        let mut index = HashMap::with_capacity(points.len());
        for (position, point) in points.iter().enumerate() {
            if index.insert(point.name.clone(), position).is_some() {
                return Err(DuplicatePointName(point.name.clone()));
            }
        }
        Ok(Self {
            device_type: device_type.into(),
            info,
            defaults,
            points,
            index,
        })
    }

    pub fn device_type(&self) -> &str {
        &self.device_type
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn defaults(&self) -> &TransportDefaults {
        &self.defaults
    }

    /// 按文档顺序迭代点位；同一周期的 Sample 按此顺序发出。
    pub fn points(&self) -> impl Iterator<Item = &PointDefinition> {
        self.points.iter()
    }

    pub fn get(&self, name: &str) -> Option<&PointDefinition> {
        self.index.get(name).map(|position| &self.points[*position])
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
