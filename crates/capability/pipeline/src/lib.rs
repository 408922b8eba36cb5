//! Sample 交付与批量写出
//!
//! - [`sink`]：Worker → 通道的交付，单次最多等待宽限期
//! - [`Pipeline`]：有界缓冲，凑满一批交给 [`SampleWriter`]（存储协作方）
//! - [`consumer`]：从通道取 Sample 送入 Pipeline，周期性 flush

use async_trait::async_trait;
use domain::Sample;
use std::time::Duration;

mod batch;
pub mod consumer;
pub mod sink;

pub use batch::{Admission, Pipeline};
pub use consumer::run_consumer;
pub use sink::{ChannelSink, NoopSink, SampleSink, sample_channel};

/// Pipeline 处理错误。
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("writer error: {0}")]
    Writer(String),
    #[error("buffer full: {buffered}/{capacity} samples")]
    BufferFull { buffered: usize, capacity: usize },
    #[error("sink timeout: {device_id}/{point_name}")]
    SinkTimeout { device_id: String, point_name: String },
    #[error("sink closed")]
    SinkClosed,
}

/// Pipeline 参数。
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// 每批 Sample 数
    pub batch_size: usize,
    /// 缓冲上限（含写失败后回填的批次）
    pub max_buffer_size: usize,
    /// 写失败后的重试次数
    pub max_retries: usize,
    /// 重试间隔
    pub retry_backoff: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_buffer_size: 1000,
            max_retries: 3,
            retry_backoff: Duration::from_millis(100),
        }
    }
}

impl PipelineConfig {
    fn sanitized(mut self) -> Self {
        self.batch_size = self.batch_size.max(1);
        self.max_buffer_size = self.max_buffer_size.max(self.batch_size);
        self
    }
}

/// Sample 写入器抽象（存储协作方）。
#[async_trait]
pub trait SampleWriter: Send + Sync {
    async fn write_batch(&self, samples: &[Sample]) -> Result<(), PipelineError>;
}

/// 丢弃所有 Sample 的写入器。
#[derive(Debug, Default)]
pub struct NoopWriter;

#[async_trait]
impl SampleWriter for NoopWriter {
    async fn write_batch(&self, _samples: &[Sample]) -> Result<(), PipelineError> {
        Ok(())
    }
}
