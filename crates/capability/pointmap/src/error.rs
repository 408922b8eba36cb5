//! 点表加载错误类型定义

use std::path::PathBuf;

/// 点表配置错误
///
/// 点位级错误只剔除该点位；文档级错误使整个点表不可用。
#[derive(Debug, thiserror::Error)]
pub enum PointMapError {
    /// 文件读取失败
    #[error("read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 文档解析失败
    #[error("parse {device_type}: {message}")]
    Parse { device_type: String, message: String },

    /// 不支持的文件格式
    #[error("unsupported point map format: {0}")]
    UnsupportedFormat(PathBuf),

    /// 没有任何有效点位
    #[error("point map {0} has no valid points")]
    Empty(String),

    /// 缺少必填数值字段
    #[error("point {point}: missing required field `{field}`")]
    MissingField { point: String, field: &'static str },

    /// 字段取值非法
    #[error("point {point}: invalid `{field}`: {reason}")]
    InvalidField {
        point: String,
        field: &'static str,
        reason: String,
    },

    /// 不支持的数据类型
    #[error("point {point}: unsupported data_type `{value}`")]
    UnsupportedDataType { point: String, value: String },

    /// 寄存器数量非正
    #[error("point {point}: register_count must be positive, got {count}")]
    InvalidRegisterCount { point: String, count: i64 },

    /// 寄存器数量与数据类型字宽不一致
    #[error("point {point}: {data_type} needs {expected} registers, configured {actual}")]
    WidthMismatch {
        point: String,
        data_type: String,
        expected: u16,
        actual: u16,
    },

    /// 点名重复
    #[error("duplicate point name: {0}")]
    DuplicatePoint(String),
}

impl PointMapError {
    /// 是否只影响单个点位。
    pub fn is_point_level(&self) -> bool {
        matches!(
            self,
            Self::MissingField { .. }
                | Self::InvalidField { .. }
                | Self::UnsupportedDataType { .. }
                | Self::InvalidRegisterCount { .. }
                | Self::WidthMismatch { .. }
                | Self::DuplicatePoint(_)
        )
    }
}
