use serde::{Deserialize, Serialize};

/// 解码器输出（尚未做工程量换算）。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DecodedValue {
    Bool(bool),
    /// bitfield16 原始值
    Bits(u16),
    Int(i64),
    Uint(u64),
    Float(f64),
}

impl DecodedValue {
    pub fn as_f64(&self) -> f64 {
        match *self {
            Self::Bool(v) => {
                if v {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Bits(v) => f64::from(v),
            Self::Int(v) => v as f64,
            Self::Uint(v) => v as f64,
            Self::Float(v) => v,
        }
    }
}

/// Sample 的取值。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SampleValue {
    Bool(bool),
    Bits(u16),
    F64(f64),
}

impl SampleValue {
    pub fn as_f64(&self) -> f64 {
        match *self {
            Self::Bool(v) => {
                if v {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Bits(v) => f64::from(v),
            Self::F64(v) => v,
        }
    }
}

impl std::fmt::Display for SampleValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{}", v),
            Self::Bits(v) => write!(f, "0x{:04x}", v),
            Self::F64(v) => write!(f, "{}", v),
        }
    }
}

/// 数据质量标记。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    Good,
    /// 降级期间重发的上次有效值
    Stale,
    /// 仿真数据（离线模式或降级兜底）
    Simulated,
    Error,
}

impl Quality {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Good => "good",
            Self::Stale => "stale",
            Self::Simulated => "simulated",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一次轮询产出的单点测量值。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub device_id: String,
    pub point_name: String,
    /// 采集时刻（毫秒）
    pub ts_ms: i64,
    /// 读取失败时为空
    pub value: Option<SampleValue>,
    pub unit: String,
    pub quality: Quality,
}

impl Sample {
    pub fn is_good(&self) -> bool {
        self.quality == Quality::Good
    }
}

/// 当前 Unix 时间（毫秒），时钟早于 epoch 时为 0。
pub fn now_epoch_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0)
}
