//! 通道消费循环

use crate::{Admission, Pipeline};
use domain::Sample;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// 从通道取 Sample 送入 Pipeline，每隔 `flush_every` 写出一次残余批次。
///
/// 取消后先排空通道，再做最后一次 flush。
pub async fn run_consumer(
    mut rx: mpsc::Receiver<Sample>,
    pipeline: Pipeline,
    flush_every: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(flush_every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut received: u64 = 0;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            maybe = rx.recv() => match maybe {
                Some(sample) => {
                    received += 1;
                    handle(&pipeline, sample).await;
                }
                None => break,
            },
            _ = ticker.tick() => flush(&pipeline).await,
        }
    }

    rx.close();
    while let Some(sample) = rx.recv().await {
        received += 1;
        handle(&pipeline, sample).await;
    }
    flush(&pipeline).await;
    info!(target: "ems.pipeline", received, "sample_consumer_stopped");
}

async fn handle(pipeline: &Pipeline, sample: Sample) {
    match pipeline.push(sample).await {
        Ok(Admission::Written { .. }) => ems_telemetry::record_batch_written(),
        Ok(_) => {}
        Err(err) => {
            ems_telemetry::record_pipeline_error();
            warn!(target: "ems.pipeline", error = %err, "sample_write_failed");
        }
    }
}

async fn flush(pipeline: &Pipeline) {
    match pipeline.flush().await {
        Ok(0) => {}
        Ok(_) => ems_telemetry::record_batch_written(),
        Err(err) => {
            ems_telemetry::record_pipeline_error();
            warn!(target: "ems.pipeline", error = %err, "sample_flush_failed");
        }
    }
}
