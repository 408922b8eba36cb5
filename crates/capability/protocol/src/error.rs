//! 协议错误类型定义

/// 一次读取的失败原因。
///
/// 链路类（连接、IO、帧、超时）由 Worker 重试；点位类（功能码、异常码）只影响当前点位。
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("unsupported function code: {0}")]
    UnsupportedOperation(u8),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 帧异常或协议层错误
    #[error("modbus error: {0}")]
    Modbus(String),

    /// 从站返回异常码
    #[error("modbus exception: {0}")]
    Exception(String),

    #[error("timeout: {0}")]
    Timeout(String),

    /// 串口参数不合法（数据位、停止位）
    #[error("invalid serial settings: {0}")]
    InvalidSerial(String),
}

impl ProtocolError {
    /// 计入重试与连续失败。
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Io(_) | Self::Modbus(_) | Self::Timeout(_)
        )
    }
}
