//! 调度错误类型定义

use std::time::Duration;

/// 调度器操作错误
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// 设备已在运行
    #[error("device already scheduled: {0}")]
    DuplicateDevice(String),

    /// 设备不存在
    #[error("unknown device: {0}")]
    UnknownDevice(String),

    /// 轮询间隔非法
    #[error("invalid poll interval {interval:?} for device {device_id}")]
    InvalidInterval { device_id: String, interval: Duration },

    /// 调度器已停机
    #[error("scheduler is shut down")]
    ShutDown,
}
