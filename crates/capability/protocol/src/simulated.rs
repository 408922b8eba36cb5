//! 仿真客户端
//!
//! 以 (功能码, 地址, 数量) 为种子生成伪随机寄存器值，同一进程内
//! 对同一寄存器区间的重复读取结果一致。
//!
//! 离线模式和降级兜底输出的是 [`simulated_value`]：按点位量程生成的工程值，
//! 而不是把随机寄存器字直接解码。

use crate::client::ProtocolClient;
use crate::error::ProtocolError;
use crate::modbus::function_code;
use async_trait::async_trait;
use domain::{DataType, PointDefinition, SampleValue, TransportKind};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// 仿真客户端
#[derive(Debug, Default, Clone)]
pub struct SimulatedClient;

impl SimulatedClient {
    pub fn new() -> Self {
        Self
    }

    /// 生成确定性寄存器值。
    pub fn words(code: u8, address: u16, count: u16) -> Result<Vec<u16>, ProtocolError> {
        let fc = function_code(code)?;
        let mut rng = seeded(code, address, count);
        let words = if fc.is_bit_access() {
            (0..count).map(|_| u16::from(rng.gen_bool(0.5))).collect()
        } else {
            (0..count).map(|_| rng.gen_range(0..=u16::MAX)).collect()
        };
        Ok(words)
    }
}

fn seeded(code: u8, address: u16, count: u16) -> StdRng {
    StdRng::seed_from_u64((u64::from(code) << 32) | (u64::from(address) << 16) | u64::from(count))
}

/// 未配置量程时的原始值区间。
fn raw_band(data_type: DataType) -> (f64, f64) {
    match data_type {
        DataType::Int16 | DataType::Int32 => (-1000.0, 1000.0),
        _ => (0.0, 1000.0),
    }
}

/// 工程值区间：`[min_value, max_value]`，缺省的一侧按数据类型区间的宽度补齐。
fn engineering_band(point: &PointDefinition) -> (f64, f64) {
    let (raw_low, raw_high) = raw_band(point.data_type);
    let scale = point.effective_scale();
    let a = raw_low * scale + point.offset;
    let b = raw_high * scale + point.offset;
    let (low, high) = (a.min(b), a.max(b));
    let width = high - low;
    match (point.min_value, point.max_value) {
        (Some(min), Some(max)) if min <= max => (min, max),
        (Some(min), None) => (min, min + width),
        (None, Some(max)) => (max - width, max),
        _ => (low, high),
    }
}

/// 点位的确定性仿真工程值，种子与 [`SimulatedClient::words`] 相同。
///
/// 数值类型落在 [`engineering_band`] 内，因此总能通过量程校验；
/// boolean / bitfield16 取随机位。
pub fn simulated_value(point: &PointDefinition) -> Result<SampleValue, ProtocolError> {
    function_code(point.function_code)?;
    let mut rng = seeded(point.function_code, point.address, point.register_count);
    let value = match point.data_type {
        DataType::Boolean => SampleValue::Bool(rng.gen_bool(0.5)),
        DataType::Bitfield16 => SampleValue::Bits(rng.gen()),
        _ => {
            let (low, high) = engineering_band(point);
            if low.is_finite() && high.is_finite() && low < high {
                SampleValue::F64(rng.gen_range(low..=high))
            } else {
                SampleValue::F64(low)
            }
        }
    };
    Ok(value)
}

#[async_trait]
impl ProtocolClient for SimulatedClient {
    async fn read(
        &mut self,
        code: u8,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, ProtocolError> {
        Self::words(code, address, count)
    }

    async fn close(&mut self) {}

    fn kind(&self) -> TransportKind {
        TransportKind::Simulated
    }
}
