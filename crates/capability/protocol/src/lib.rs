//! # 协议通信能力模块
//!
//! 为轮询 Worker 提供统一的寄存器读取接口，支持：
//! - **Modbus TCP**：按需建连，失败后下次读取重连
//! - **Modbus RTU**：RS485 串口链路
//! - **仿真**：按 (功能码, 地址, 数量) 生成确定性数据，无需真实设备
//!
//! ## 架构设计
//!
//! ```text
//! DeviceConnection (transport + unit_id + timeout)
//!       │
//!       ▼
//! create_client()
//!       │
//!       ├── ModbusTcpClient
//!       ├── ModbusRtuClient
//!       └── SimulatedClient
//!       │
//!       ▼
//! Vec<u16> ──decode()──▶ DecodedValue
//! ```
//!
//! 线圈/离散输入按 0/1 字返回，解码层与寄存器一视同仁。

mod client;
mod decode;
mod error;
mod modbus;
mod modbus_rtu;
mod modbus_tcp;
mod simulated;

pub use client::{create_client, ProtocolClient};
pub use decode::{decode, encode, DecodeError};
pub use error::ProtocolError;
pub use modbus_rtu::ModbusRtuClient;
pub use modbus_tcp::ModbusTcpClient;
pub use simulated::{simulated_value, SimulatedClient};
