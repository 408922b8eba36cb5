//! 工程量换算：解码值 → 工程值。
//!
//! 换算顺序固定为先乘 scale 再加 offset，
//! 量程越界不丢弃读数，由调用方把 Sample 标记为 error。

mod units;

pub use units::{UnitConversion, normalize_unit};

use domain::{DecodedValue, PointDefinition, SampleValue};

/// 换算结果。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Engineering {
    pub value: SampleValue,
    /// 有限值且落在 min/max 之内
    pub valid: bool,
}

/// `raw * scale + offset`。
pub fn apply_scaling(raw: f64, scale: f64, offset: f64) -> f64 {
    raw * scale + offset
}

/// 软量程校验，未配置的边界不参与比较。
pub fn within_range(value: f64, min_value: Option<f64>, max_value: Option<f64>) -> bool {
    if !value.is_finite() {
        return false;
    }
    if let Some(min) = min_value {
        if value < min {
            return false;
        }
    }
    if let Some(max) = max_value {
        if value > max {
            return false;
        }
    }
    true
}

/// 按点位定义把解码值换算为工程值。
///
/// boolean / bitfield16 原样透传，不参与缩放和量程校验。
pub fn to_engineering(decoded: DecodedValue, point: &PointDefinition) -> Engineering {
    match decoded {
        DecodedValue::Bool(v) => Engineering {
            value: SampleValue::Bool(v),
            valid: true,
        },
        DecodedValue::Bits(v) => Engineering {
            value: SampleValue::Bits(v),
            valid: true,
        },
        numeric => {
            let value = apply_scaling(numeric.as_f64(), point.effective_scale(), point.offset);
            Engineering {
                value: SampleValue::F64(value),
                valid: within_range(value, point.min_value, point.max_value),
            }
        }
    }
}
