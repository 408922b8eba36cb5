//! Worker 状态

use domain::SampleValue;
use serde::Serialize;
use std::collections::HashMap;

/// 周期阶段。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Connecting,
    Reading,
    Decoding,
    Emitting,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Reading => "reading",
            Self::Decoding => "decoding",
            Self::Emitting => "emitting",
        }
    }
}

/// 单台设备的轮询状态，由 Worker 独占。
#[derive(Debug, Default)]
pub struct PollState {
    /// 连续失败的周期数
    pub consecutive_failures: u32,
    pub last_success_ms: Option<i64>,
    pub degraded: bool,
    pub cycles: u64,
    last_values: HashMap<String, SampleValue>,
}

impl PollState {
    /// 周期失败，返回是否因此进入降级。
    pub fn record_failure(&mut self, threshold: u32) -> bool {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        let entering = !self.degraded && self.consecutive_failures >= threshold.max(1);
        if entering {
            self.degraded = true;
        }
        entering
    }

    /// 周期成功，返回是否因此退出降级。
    pub fn record_success(&mut self, ts_ms: i64) -> bool {
        let leaving = self.degraded;
        self.consecutive_failures = 0;
        self.degraded = false;
        self.last_success_ms = Some(ts_ms);
        leaving
    }

    pub fn remember(&mut self, point_name: &str, value: SampleValue) {
        self.last_values.insert(point_name.to_string(), value);
    }

    pub fn last_value(&self, point_name: &str) -> Option<SampleValue> {
        self.last_values.get(point_name).copied()
    }
}
