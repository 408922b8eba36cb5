use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// 轮询间隔下限（含）。
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// 轮询间隔上限（含），一天。
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(86_400);

/// 策略字符串解析错误。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct PolicyParseError {
    pub kind: &'static str,
    pub value: String,
}

/// 降级后每个点位的兜底输出。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// quality=error，无值
    Error,
    /// 仿真值，quality=simulated
    #[default]
    Simulated,
    /// 上次有效值，quality=stale
    HoldLast,
}

impl FromStr for FallbackPolicy {
    type Err = PolicyParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "simulated" | "simulation" => Ok(Self::Simulated),
            "hold_last" | "stale" => Ok(Self::HoldLast),
            _ => Err(PolicyParseError {
                kind: "fallback policy",
                value: value.to_string(),
            }),
        }
    }
}

/// 点表中点名重复时的处理。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// 保留首个，后续重复项作为配置错误剔除
    #[default]
    Reject,
    /// 后续重复项重命名为 `<name>_2`、`<name>_3` ...
    Uniquify,
}

impl FromStr for DuplicatePolicy {
    type Err = PolicyParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "uniquify" | "rename" => Ok(Self::Uniquify),
            _ => Err(PolicyParseError {
                kind: "duplicate policy",
                value: value.to_string(),
            }),
        }
    }
}
