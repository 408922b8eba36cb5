//! Sample 交付

use crate::PipelineError;
use async_trait::async_trait;
use domain::Sample;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;

/// Sample 接收方。
///
/// `emit` 的等待时间必须有界，慢消费方不能拖住 Worker 的轮询节奏。
#[async_trait]
pub trait SampleSink: Send + Sync {
    async fn emit(&self, sample: Sample) -> Result<(), PipelineError>;
}

/// 基于有界通道的交付，单个 Sample 最多等待 `grace`。
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<Sample>,
    grace: Duration,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<Sample>, grace: Duration) -> Self {
        Self { tx, grace }
    }
}

/// 创建通道，返回交付端与接收端。
pub fn sample_channel(capacity: usize, grace: Duration) -> (ChannelSink, mpsc::Receiver<Sample>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (ChannelSink::new(tx, grace), rx)
}

#[async_trait]
impl SampleSink for ChannelSink {
    async fn emit(&self, sample: Sample) -> Result<(), PipelineError> {
        self.tx
            .send_timeout(sample, self.grace)
            .await
            .map_err(|err| match err {
                SendTimeoutError::Timeout(sample) => PipelineError::SinkTimeout {
                    device_id: sample.device_id,
                    point_name: sample.point_name,
                },
                SendTimeoutError::Closed(_) => PipelineError::SinkClosed,
            })
    }
}

/// 丢弃所有 Sample。
#[derive(Debug, Default, Clone)]
pub struct NoopSink;

#[async_trait]
impl SampleSink for NoopSink {
    async fn emit(&self, _sample: Sample) -> Result<(), PipelineError> {
        Ok(())
    }
}
