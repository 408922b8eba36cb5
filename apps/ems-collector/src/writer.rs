//! 日志写出器：以结构化日志代替存储协作方。

use async_trait::async_trait;
use domain::{Quality, Sample};
use ems_pipeline::{PipelineError, SampleWriter};
use tracing::{debug, info};

pub struct LogSampleWriter;

#[async_trait]
impl SampleWriter for LogSampleWriter {
    async fn write_batch(&self, samples: &[Sample]) -> Result<(), PipelineError> {
        let good = samples.iter().filter(|s| s.quality == Quality::Good).count();
        for sample in samples {
            let value = sample
                .value
                .map(|value| value.to_string())
                .unwrap_or_default();
            debug!(
                target: "ems.collector",
                device_id = %sample.device_id,
                point = %sample.point_name,
                ts_ms = sample.ts_ms,
                value = %value,
                unit = %sample.unit,
                quality = sample.quality.as_str(),
                "sample_written"
            );
        }
        info!(
            target: "ems.collector",
            samples = samples.len(),
            good,
            "sample_batch_written"
        );
        Ok(())
    }
}
