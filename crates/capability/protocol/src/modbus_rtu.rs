//! Modbus RTU 客户端实现（RS485 串口）

use crate::client::ProtocolClient;
use crate::error::ProtocolError;
use crate::modbus::{function_code, read_words};
use async_trait::async_trait;
use domain::{Parity, SerialSettings, TransportKind};
use std::time::Duration;
use tokio_modbus::client::{rtu, Context};
use tokio_modbus::prelude::{Client, Slave};
use tokio_serial::SerialStream;
use tracing::{debug, info};

/// Modbus RTU 客户端
pub struct ModbusRtuClient {
    settings: SerialSettings,
    unit_id: u8,
    timeout: Duration,
    ctx: Option<Context>,
}

impl ModbusRtuClient {
    pub fn new(settings: SerialSettings, unit_id: u8, timeout: Duration) -> Self {
        Self {
            settings,
            unit_id,
            timeout,
            ctx: None,
        }
    }

    fn open(&self) -> Result<Context, ProtocolError> {
        let builder = tokio_serial::new(self.settings.serial_port.as_str(), self.settings.baudrate)
            .data_bits(data_bits(self.settings.data_bits)?)
            .parity(parity(self.settings.parity))
            .stop_bits(stop_bits(self.settings.stop_bits)?)
            .timeout(self.timeout);
        let port = SerialStream::open(&builder).map_err(|e| {
            ProtocolError::Connection(format!("open {}: {}", self.settings.serial_port, e))
        })?;

        info!(
            target: "ems.protocol",
            port = %self.settings.serial_port,
            baudrate = self.settings.baudrate,
            unit_id = self.unit_id,
            "modbus_rtu_opened"
        );
        Ok(rtu::attach_slave(port, Slave(self.unit_id)))
    }
}

fn data_bits(bits: u8) -> Result<tokio_serial::DataBits, ProtocolError> {
    match bits {
        5 => Ok(tokio_serial::DataBits::Five),
        6 => Ok(tokio_serial::DataBits::Six),
        7 => Ok(tokio_serial::DataBits::Seven),
        8 => Ok(tokio_serial::DataBits::Eight),
        other => Err(ProtocolError::InvalidSerial(format!("invalid data bits: {}", other))),
    }
}

fn stop_bits(bits: u8) -> Result<tokio_serial::StopBits, ProtocolError> {
    match bits {
        1 => Ok(tokio_serial::StopBits::One),
        2 => Ok(tokio_serial::StopBits::Two),
        other => Err(ProtocolError::InvalidSerial(format!("invalid stop bits: {}", other))),
    }
}

fn parity(parity: Parity) -> tokio_serial::Parity {
    match parity {
        Parity::None => tokio_serial::Parity::None,
        Parity::Even => tokio_serial::Parity::Even,
        Parity::Odd => tokio_serial::Parity::Odd,
    }
}

#[async_trait]
impl ProtocolClient for ModbusRtuClient {
    async fn read(
        &mut self,
        code: u8,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, ProtocolError> {
        function_code(code)?;

        let mut ctx = match self.ctx.take() {
            Some(ctx) => ctx,
            None => self.open()?,
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
                    port = %self.settings.serial_port,
                    error = %err,
                    "modbus_rtu_dropped"
                );
                Err(err)
            }
        }
    }

    async fn close(&mut self) {
        if let Some(mut ctx) = self.ctx.take() {
            let _ = ctx.disconnect().await;
            debug!(target: "ems.protocol", port = %self.settings.serial_port, "modbus_rtu_closed");
        }
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Rtu
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_framing_is_validated() {
        assert!(data_bits(8).is_ok());
        assert!(matches!(data_bits(9), Err(ProtocolError::InvalidSerial(_))));
        assert!(stop_bits(2).is_ok());
        assert!(stop_bits(3).is_err());
        assert_eq!(parity(Parity::Even), tokio_serial::Parity::Even);
    }

    #[tokio::test]
    async fn missing_port_is_a_transport_error() {
        let settings = SerialSettings {
            serial_port: "/dev/ems-no-such-port".into(),
            ..SerialSettings::default()
        };
        let mut client = ModbusRtuClient::new(settings, 1, Duration::from_millis(100));
        let err = client.read(3, 0, 1).await.unwrap_err();
        assert!(err.is_transport());
    }
}
