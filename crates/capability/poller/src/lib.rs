//! 轮询引擎
//!
//! 每台设备一个独立任务（[`PollWorker`]），按设备的轮询间隔 ± 抖动触发周期：
//!
//! ```text
//! Idle → Connecting → Reading → Decoding → Emitting → Idle
//!                        │
//!                        └─ 重试耗尽 → 兜底输出（error / simulated / stale）
//! ```
//!
//! 同一设备任意时刻最多一个周期在执行，周期未结束时到期的 tick 直接丢弃并计数。
//! [`Scheduler`] 负责设备的增删、改周期、看门狗重启与停机。

mod error;
mod scheduler;
mod state;
mod status;
mod ticker;
mod worker;

pub use error::SchedulerError;
pub use scheduler::{ClientFactory, DeviceSpec, Scheduler, SchedulerConfig, TransportFactory};
pub use state::{Phase, PollState};
pub use status::{DeviceStatus, StatusBoard};
pub use ticker::Ticker;
pub use worker::{CycleOutcome, PollWorker, WorkerConfig};
