//! 设备传输参数。

use serde::{Deserialize, Serialize};

/// 传输类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    Tcp,
    Rtu,
    Simulated,
}

impl TransportKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Rtu => "rtu",
            Self::Simulated => "simulated",
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 串口校验位。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Parity {
    #[default]
    #[serde(rename = "none", alias = "N", alias = "n")]
    None,
    #[serde(rename = "even", alias = "E", alias = "e")]
    Even,
    #[serde(rename = "odd", alias = "O", alias = "o")]
    Odd,
}

/// 串口参数（RS485 / Modbus RTU）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerialSettings {
    #[serde(default = "default_serial_port")]
    pub serial_port: String,
    #[serde(default = "default_baudrate", alias = "baud_rate")]
    pub baudrate: u32,
    #[serde(default = "default_data_bits", alias = "bytesize")]
    pub data_bits: u8,
    #[serde(default)]
    pub parity: Parity,
    #[serde(default = "default_stop_bits", alias = "stopbits")]
    pub stop_bits: u8,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            serial_port: default_serial_port(),
            baudrate: default_baudrate(),
            data_bits: default_data_bits(),
            parity: Parity::None,
            stop_bits: default_stop_bits(),
        }
    }
}

fn default_serial_port() -> String {
    "/dev/ttyUSB0".to_string()
}

fn default_baudrate() -> u32 {
    9600
}

fn default_data_bits() -> u8 {
    8
}

fn default_stop_bits() -> u8 {
    1
}

fn default_modbus_port() -> u16 {
    502
}

/// 传输层参数，按 `kind` 区分。
///
/// ```yaml
/// kind: tcp
/// host: 192.168.1.100
/// port: 502
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transport {
    #[serde(alias = "modbus_tcp")]
    Tcp {
        host: String,
        #[serde(default = "default_modbus_port")]
        port: u16,
    },
    #[serde(alias = "modbus_rtu", alias = "rs485", alias = "serial")]
    Rtu(SerialSettings),
    #[serde(alias = "simulation")]
    Simulated,
}

impl Transport {
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Tcp { .. } => TransportKind::Tcp,
            Self::Rtu(_) => TransportKind::Rtu,
            Self::Simulated => TransportKind::Simulated,
        }
    }

    /// 日志中使用的端点描述。
    pub fn endpoint(&self) -> String {
        match self {
            Self::Tcp { host, port } => format!("{}:{}", host, port),
            Self::Rtu(serial) => serial.serial_port.clone(),
            Self::Simulated => "simulated".to_string(),
        }
    }
}

/// 单台设备的连接参数，由该设备的 Worker 独占。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceConnection {
    pub transport: Transport,
    /// 从站 ID（每帧携带）
    pub unit_id: u8,
    /// 单次读超时（毫秒）
    pub timeout_ms: u64,
    /// 单次读的总尝试次数
    pub retries: u32,
}

impl DeviceConnection {
    pub fn kind(&self) -> TransportKind {
        self.transport.kind()
    }

    pub fn simulated() -> Self {
        Self {
            transport: Transport::Simulated,
            unit_id: 1,
            timeout_ms: 1000,
            retries: 1,
        }
    }
}
