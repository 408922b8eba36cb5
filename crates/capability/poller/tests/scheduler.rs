mod common;

use async_trait::async_trait;
use common::*;
use domain::Sample;
use ems_pipeline::{PipelineError, SampleSink};
use ems_poller::{Scheduler, SchedulerConfig, SchedulerError};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

fn config() -> SchedulerConfig {
    SchedulerConfig {
        jitter: Duration::ZERO,
        ..SchedulerConfig::default()
    }
}

fn scheduler(
    config: SchedulerConfig,
    factory: &Arc<FakeFactory>,
) -> (Scheduler, Arc<CollectingSink>) {
    let sink = Arc::new(CollectingSink::default());
    let scheduler = Scheduler::new(config, factory.clone(), sink.clone());
    (scheduler, sink)
}

#[tokio::test(start_paused = true)]
async fn add_rejects_duplicates_and_out_of_range_intervals() {
    let factory = FakeFactory::new(Behavior::Registers(meter_registers()));
    let (scheduler, _) = scheduler(config(), &factory);

    scheduler
        .add_device(spec("meter-1", Duration::from_secs(10), 1000, 1))
        .await
        .unwrap();
    let err = scheduler
        .add_device(spec("meter-1", Duration::from_secs(10), 1000, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::DuplicateDevice(id) if id == "meter-1"));

    for interval in [
        Duration::ZERO,
        Duration::from_millis(4999),
        Duration::from_secs(2 * 86_400),
    ] {
        let err = scheduler
            .add_device(spec("meter-2", interval, 1000, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidInterval { .. }), "{interval:?}");
    }

    assert_eq!(scheduler.device_ids().await, ["meter-1"]);
    assert_eq!(factory.created.load(Ordering::SeqCst), 1);
    scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn remove_stops_worker_and_clears_status() {
    let factory = FakeFactory::new(Behavior::Registers(meter_registers()));
    let (scheduler, sink) = scheduler(config(), &factory);
    scheduler
        .add_device(spec("meter-1", Duration::from_secs(10), 1000, 1))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(scheduler.status().await.len(), 1);

    scheduler.remove_device("meter-1").await.unwrap();
    assert!(scheduler.device_ids().await.is_empty());
    assert!(scheduler.status().await.is_empty());

    let emitted = sink.samples().len();
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(sink.samples().len(), emitted);
    assert_eq!(factory.counters.opens(), factory.counters.closes());

    let err = scheduler.remove_device("meter-1").await.unwrap_err();
    assert!(matches!(err, SchedulerError::UnknownDevice(_)));
}

#[tokio::test(start_paused = true)]
async fn retime_replaces_worker_exactly_once() {
    let factory = FakeFactory::new(Behavior::Registers(meter_registers()));
    let (scheduler, _) = scheduler(config(), &factory);
    scheduler
        .add_device(spec("meter-1", Duration::from_secs(10), 1000, 1))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    scheduler
        .retime_device("meter-1", Duration::from_secs(20))
        .await
        .unwrap();
    let before = factory.counters.reads();
    // 新 Worker 立即触发，其后 20s / 40s 各一次
    tokio::time::sleep(Duration::from_secs(59)).await;

    assert_eq!(factory.created.load(Ordering::SeqCst), 2);
    assert_eq!(factory.counters.reads() - before, 6);
    assert_eq!(factory.counters.max_in_flight.load(Ordering::SeqCst), 1);
    let status = scheduler.status().await;
    assert_eq!(status.len(), 1);
    assert_eq!(status[0].poll_interval_ms, 20_000);
    assert_eq!(
        scheduler.device_spec("meter-1").await.unwrap().poll_interval,
        Duration::from_secs(20)
    );

    let err = scheduler
        .retime_device("meter-1", Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidInterval { .. }));
    assert_eq!(
        scheduler.device_spec("meter-1").await.unwrap().poll_interval,
        Duration::from_secs(20)
    );
    scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn watchdog_restarts_stuck_worker() {
    let factory = FakeFactory::new(Behavior::Hang);
    let config = SchedulerConfig {
        watchdog_interval: Duration::from_secs(1),
        watchdog_margin: Duration::from_secs(1),
        shutdown_grace: Duration::from_secs(1),
        ..config()
    };
    let (scheduler, sink) = scheduler(config, &factory);
    scheduler
        .add_device(spec("meter-1", Duration::from_secs(5), 120_000, 1))
        .await
        .unwrap();
    let watchdog = scheduler.start_watchdog();

    tokio::time::sleep(Duration::from_secs(10)).await;
    let status = scheduler.status().await;
    assert!(status[0].restarts >= 1);
    assert!(factory.created.load(Ordering::SeqCst) >= 2);
    // 被取消的周期不产出 Sample
    assert!(sink.samples().is_empty());
    assert!(factory.counters.closes() >= 1);

    scheduler.shutdown().await;
    watchdog.await.unwrap();
    assert_eq!(factory.counters.opens(), factory.counters.closes());
}

#[tokio::test(start_paused = true)]
async fn sweep_ignores_healthy_workers() {
    let factory = FakeFactory::new(Behavior::Registers(meter_registers()));
    let (scheduler, _) = scheduler(config(), &factory);
    scheduler
        .add_device(spec("meter-1", Duration::from_secs(10), 1000, 1))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(25)).await;
    assert_eq!(scheduler.sweep().await, 0);
    assert_eq!(factory.created.load(Ordering::SeqCst), 1);
    scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_lets_cycles_finish_then_refuses_new_devices() {
    let factory = FakeFactory::new(Behavior::Slow(Duration::from_secs(3)));
    let config = SchedulerConfig {
        shutdown_grace: Duration::from_secs(10),
        ..config()
    };
    let (scheduler, sink) = scheduler(config, &factory);
    for id in ["meter-1", "meter-2"] {
        scheduler
            .add_device(spec(id, Duration::from_secs(10), 5000, 1))
            .await
            .unwrap();
    }
    tokio::time::sleep(Duration::from_secs(1)).await;

    scheduler.shutdown().await;
    assert!(scheduler.device_ids().await.is_empty());
    assert_eq!(sink.samples().len(), 4);
    assert_eq!(factory.counters.opens(), factory.counters.closes());
    assert_eq!(factory.counters.in_flight.load(Ordering::SeqCst), 0);

    let err = scheduler
        .add_device(spec("meter-3", Duration::from_secs(10), 5000, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::ShutDown));
}

/// 指定设备的 Sample 永远交付不出去，其余设备正常收集。
struct BlockingSink {
    blocked_device: &'static str,
    delivered: Mutex<Vec<(Instant, Sample)>>,
}

#[async_trait]
impl SampleSink for BlockingSink {
    async fn emit(&self, sample: Sample) -> Result<(), PipelineError> {
        if sample.device_id == self.blocked_device {
            std::future::pending::<()>().await;
        }
        self.delivered.lock().unwrap().push((Instant::now(), sample));
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn blocked_sink_for_one_device_does_not_stall_others() {
    let factory = FakeFactory::new(Behavior::Registers(meter_registers()));
    let sink = Arc::new(BlockingSink {
        blocked_device: "stuck",
        delivered: Mutex::new(Vec::new()),
    });
    let config = SchedulerConfig {
        sink_grace: Duration::from_secs(1),
        ..config()
    };
    let scheduler = Scheduler::new(config, factory.clone(), sink.clone());
    let started = Instant::now();
    for id in ["stuck", "meter-1"] {
        scheduler
            .add_device(spec(id, Duration::from_secs(10), 1000, 1))
            .await
            .unwrap();
    }

    // tick 于 0/10/20/30 秒
    tokio::time::sleep(Duration::from_secs(35)).await;

    let delivered = sink.delivered.lock().unwrap().clone();
    assert!(delivered.iter().all(|(_, s)| s.device_id == "meter-1"));
    assert_eq!(delivered.len(), 8);
    let voltage: Vec<_> = delivered
        .iter()
        .filter(|(_, s)| s.point_name == "Voltage")
        .map(|(at, _)| at.duration_since(started))
        .collect();
    for (cycle, at) in voltage.iter().enumerate() {
        let planned = Duration::from_secs(10 * cycle as u64);
        assert!(*at >= planned && *at < planned + Duration::from_secs(1), "{at:?}");
    }

    let stuck = scheduler
        .status()
        .await
        .into_iter()
        .find(|s| s.device_id == "stuck")
        .unwrap();
    // 每个周期两次交付各等满 1 秒，仍在下一次 tick 之前结束
    assert_eq!(stuck.cycles, 4);
    assert_eq!(stuck.ticks_dropped, 0);
    scheduler.shutdown().await;
}
