//! 协议客户端接口

use crate::error::ProtocolError;
use crate::modbus_rtu::ModbusRtuClient;
use crate::modbus_tcp::ModbusTcpClient;
use crate::simulated::SimulatedClient;
use async_trait::async_trait;
use domain::{DeviceConnection, Transport, TransportKind};
use std::time::Duration;

/// 寄存器读取接口
///
/// 每个实例由一个 Worker 独占，读取需要 `&mut self`。
#[async_trait]
pub trait ProtocolClient: Send {
    /// 读取 `count` 个寄存器字；线圈/离散输入按 0/1 字返回。
    async fn read(
        &mut self,
        function_code: u8,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, ProtocolError>;

    /// 关闭连接，可重复调用。
    async fn close(&mut self);

    fn kind(&self) -> TransportKind;
}

/// 按传输类型创建客户端。
pub fn create_client(connection: &DeviceConnection) -> Box<dyn ProtocolClient> {
    let timeout = Duration::from_millis(connection.timeout_ms);
    match &connection.transport {
        Transport::Tcp { host, port } => Box::new(ModbusTcpClient::new(
            host.clone(),
            *port,
            connection.unit_id,
            timeout,
        )),
        Transport::Rtu(settings) => Box::new(ModbusRtuClient::new(
            settings.clone(),
            connection.unit_id,
            timeout,
        )),
        Transport::Simulated => Box::new(SimulatedClient::new()),
    }
}
