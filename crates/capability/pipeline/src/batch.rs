//! 批量缓冲

use crate::{PipelineConfig, PipelineError, SampleWriter};
use domain::{Quality, Sample, SampleValue};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// 单个 Sample 进入 Pipeline 的结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// 已缓冲，等待凑批或 flush
    Queued { buffered: usize },
    /// 触发了一次批量写出
    Written { samples: usize },
    /// 时间戳非法，无法写出
    Skipped(&'static str),
}

struct Shared {
    writer: Arc<dyn SampleWriter>,
    config: PipelineConfig,
    buffer: Mutex<VecDeque<Sample>>,
}

/// 批量 Pipeline（可克隆，共享同一缓冲）。
#[derive(Clone)]
pub struct Pipeline {
    shared: Arc<Shared>,
}

impl Pipeline {
    pub fn new(writer: Arc<dyn SampleWriter>) -> Self {
        Self::with_config(writer, PipelineConfig::default())
    }

    pub fn with_config(writer: Arc<dyn SampleWriter>, config: PipelineConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                writer,
                config: config.sanitized(),
                buffer: Mutex::new(VecDeque::new()),
            }),
        }
    }

    /// 缓冲一个 Sample，凑满一批时写出最早的一批。
    ///
    /// error 质量且无值的 Sample 同样写出，下游据此感知读取失败；
    /// 非有限数值清空后按 error 写出。
    pub async fn push(&self, mut sample: Sample) -> Result<Admission, PipelineError> {
        if sample.ts_ms <= 0 {
            debug!(
                target: "ems.pipeline",
                device_id = %sample.device_id,
                point = %sample.point_name,
                ts_ms = sample.ts_ms,
                "sample_skipped"
            );
            return Ok(Admission::Skipped("invalid_ts"));
        }
        if let Some(SampleValue::F64(v)) = sample.value {
            if !v.is_finite() {
                debug!(
                    target: "ems.pipeline",
                    device_id = %sample.device_id,
                    point = %sample.point_name,
                    "sample_value_not_finite"
                );
                sample.value = None;
                sample.quality = Quality::Error;
            }
        }

        let batch: Vec<Sample> = {
            let mut buffer = self.shared.buffer.lock().await;
            let capacity = self.shared.config.max_buffer_size;
            if buffer.len() >= capacity {
                return Err(PipelineError::BufferFull {
                    buffered: buffer.len(),
                    capacity,
                });
            }
            buffer.push_back(sample);
            let batch_size = self.shared.config.batch_size;
            if buffer.len() < batch_size {
                return Ok(Admission::Queued {
                    buffered: buffer.len(),
                });
            }
            buffer.drain(..batch_size).collect()
        };

        let samples = self.deliver(batch).await?;
        Ok(Admission::Written { samples })
    }

    /// 写出缓冲区中全部剩余 Sample，返回写出数量。
    pub async fn flush(&self) -> Result<usize, PipelineError> {
        let batch: Vec<Sample> = self.shared.buffer.lock().await.drain(..).collect();
        if batch.is_empty() {
            return Ok(0);
        }
        self.deliver(batch).await
    }

    pub async fn buffered(&self) -> usize {
        self.shared.buffer.lock().await.len()
    }

    /// 写出一批；重试耗尽后整批回填到缓冲区头部。
    async fn deliver(&self, batch: Vec<Sample>) -> Result<usize, PipelineError> {
        let config = &self.shared.config;
        let mut attempt = 0;
        let err = loop {
            match self.shared.writer.write_batch(&batch).await {
                Ok(()) => return Ok(batch.len()),
                Err(err) if attempt >= config.max_retries => break err,
                Err(err) => {
                    attempt += 1;
                    debug!(target: "ems.pipeline", attempt, error = %err, "sample_batch_retry");
                    tokio::time::sleep(config.retry_backoff).await;
                }
            }
        };

        let mut buffer = self.shared.buffer.lock().await;
        if buffer.len() + batch.len() > config.max_buffer_size {
            warn!(
                target: "ems.pipeline",
                dropped = batch.len(),
                buffered = buffer.len(),
                "sample_batch_dropped"
            );
        } else {
            // 回填保持单设备内的时间顺序
            for sample in batch.into_iter().rev() {
                buffer.push_front(sample);
            }
        }
        Err(err)
    }
}
