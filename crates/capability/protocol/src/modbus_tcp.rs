//! Modbus TCP 客户端实现
//!
//! 首次读取时建连；传输失败后丢弃连接，下一次读取重新建连。
//! 从站异常码不影响连接。
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! let mut client = ModbusTcpClient::new("192.168.1.100".into(), 502, 1, Duration::from_secs(3));
//! let words = client.read(3, 0, 2).await?;
//! ```

use crate::client::ProtocolClient;
use crate::error::ProtocolError;
use crate::modbus::{function_code, read_words};
use async_trait::async_trait;
use domain::TransportKind;
use std::time::Duration;
use tokio::net::lookup_host;
use tokio_modbus::client::{tcp, Context};
use tokio_modbus::prelude::{Client, Slave};
use tracing::{debug, info};

/// Modbus TCP 客户端
pub struct ModbusTcpClient {
    host: String,
    port: u16,
    unit_id: u8,
    connect_timeout: Duration,
    ctx: Option<Context>,
}

impl ModbusTcpClient {
    pub fn new(host: String, port: u16, unit_id: u8, connect_timeout: Duration) -> Self {
        Self {
            host,
            port,
            unit_id,
            connect_timeout,
            ctx: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.ctx.is_some()
    }

    /// 不借用 `self`：`Context` 非 `Sync`。
    async fn connect(
        host: &str,
        port: u16,
        unit_id: u8,
        connect_timeout: Duration,
    ) -> Result<Context, ProtocolError> {
        let addr = lookup_host((host, port))
            .await?
            .next()
            .ok_or_else(|| ProtocolError::Connection(format!("cannot resolve {}:{}", host, port)))?;

        let ctx = tokio::time::timeout(connect_timeout, tcp::connect_slave(addr, Slave(unit_id)))
            .await
            .map_err(|_| ProtocolError::Timeout(format!("connect {}", addr)))?
            .map_err(|e| ProtocolError::Connection(e.to_string()))?;

        info!(target: "ems.protocol", %addr, unit_id, "modbus_tcp_connected");
        Ok(ctx)
    }
}

#[async_trait]
impl ProtocolClient for ModbusTcpClient {
    async fn read(
        &mut self,
        code: u8,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, ProtocolError> {
        function_code(code)?;

        // 读取期间连接被取出；若 future 被取消，连接随之释放
        let mut ctx = match self.ctx.take() {
            Some(ctx) => ctx,
            None => {
                Self::connect(&self.host, self.port, self.unit_id, self.connect_timeout).await?
            }
        };

        match read_words(&mut ctx, self.unit_id, code, address, count).await {
            Ok(words) => {
                self.ctx = Some(ctx);
                Ok(words)
            }
            Err(err) if !err.is_transport() => {
                self.ctx = Some(ctx);
                Err(err)
            }
            Err(err) => {
                let _ = ctx.disconnect().await;
                debug!(
                    target: "ems.protocol",
                    host = %self.host,
                    error = %err,
                    "modbus_tcp_dropped",
                );
                Err(err)
            }
        }
    }

    async fn close(&mut self) {
        if let Some(mut ctx) = self.ctx.take() {
            let _ = ctx.disconnect().await;
            debug!(target: "ems.protocol", host = %self.host, "modbus_tcp_closed");
        }
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Tcp
    }
}
