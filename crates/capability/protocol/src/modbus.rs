//! Modbus 读请求（TCP / RTU 共用）

use crate::error::ProtocolError;
use domain::FunctionCode;
use tokio_modbus::client::Context;
use tokio_modbus::prelude::{Reader, Slave, SlaveContext};
use tracing::debug;

/// 校验功能码，未知功能码为点位级错误。
pub(crate) fn function_code(code: u8) -> Result<FunctionCode, ProtocolError> {
    FunctionCode::try_from(code).map_err(ProtocolError::UnsupportedOperation)
}

/// 在已建立的连接上读取寄存器字。
pub(crate) async fn read_words(
    ctx: &mut Context,
    unit_id: u8,
    code: u8,
    address: u16,
    count: u16,
) -> Result<Vec<u16>, ProtocolError> {
    let fc = function_code(code)?;
    ctx.set_slave(Slave(unit_id));

    let words = match fc {
        FunctionCode::ReadCoils => bits_to_words(
            ctx.read_coils(address, count)
                .await
                .map_err(transport_error)?
                .map_err(exception_error)?,
            count,
        ),
        FunctionCode::ReadDiscreteInputs => bits_to_words(
            ctx.read_discrete_inputs(address, count)
                .await
                .map_err(transport_error)?
                .map_err(exception_error)?,
            count,
        ),
        FunctionCode::ReadHoldingRegisters => ctx
            .read_holding_registers(address, count)
            .await
            .map_err(transport_error)?
            .map_err(exception_error)?,
        FunctionCode::ReadInputRegisters => ctx
            .read_input_registers(address, count)
            .await
            .map_err(transport_error)?
            .map_err(exception_error)?,
    };

    if words.len() < usize::from(count) {
        return Err(ProtocolError::Modbus(format!(
            "short response: expected {} words, got {}",
            count,
            words.len()
        )));
    }

    debug!(
        target: "ems.protocol",
        slave = unit_id,
        function_code = code,
        register = address,
        count,
        values = ?words,
        "read_modbus_registers"
    );
    Ok(words)
}

/// 线圈响应按字节补齐，截断到请求数量。
fn bits_to_words(bits: Vec<bool>, count: u16) -> Vec<u16> {
    bits.into_iter().take(usize::from(count)).map(u16::from).collect()
}

fn transport_error(err: tokio_modbus::Error) -> ProtocolError {
    match err {
        tokio_modbus::Error::Transport(io) => ProtocolError::Io(io),
        other => ProtocolError::Modbus(other.to_string()),
    }
}

fn exception_error(code: tokio_modbus::ExceptionCode) -> ProtocolError {
    ProtocolError::Exception(format!("{:?}", code))
}
