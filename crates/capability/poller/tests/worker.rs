mod common;

use common::*;
use domain::{
    DataType, DeviceInfo, FallbackPolicy, PointDefinition, PointMap, Quality, SampleValue,
    TransportDefaults,
};
use ems_poller::{CycleOutcome, DeviceStatus, Phase, PollWorker, StatusBoard, WorkerConfig};
use ems_protocol::SimulatedClient;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

fn worker(
    behavior: Behavior,
    map: Arc<PointMap>,
    config: WorkerConfig,
) -> (PollWorker, Arc<Counters>, Arc<CollectingSink>) {
    let counters = Arc::new(Counters::default());
    let sink = Arc::new(CollectingSink::default());
    let worker = PollWorker::new(
        "dev-1",
        Box::new(FakeClient::new(behavior, Arc::clone(&counters))),
        map,
        config,
        sink.clone(),
        StatusBoard::new(),
    );
    (worker, counters, sink)
}

fn far_deadline() -> Instant {
    Instant::now() + Duration::from_secs(3600)
}

#[tokio::test(start_paused = true)]
async fn good_cycle_decodes_scales_and_keeps_order() {
    let (mut worker, _, sink) = worker(
        Behavior::Registers(meter_registers()),
        meter_map(),
        WorkerConfig::default(),
    );
    assert_eq!(worker.run_cycle(far_deadline()).await, CycleOutcome::Completed);

    let samples = sink.samples();
    let names: Vec<_> = samples.iter().map(|s| s.point_name.as_str()).collect();
    assert_eq!(names, ["Voltage", "Current"]);
    assert!(samples.iter().all(|s| s.quality == Quality::Good));
    assert_eq!(samples[0].value, Some(SampleValue::F64(50.0625)));
    let current = samples[1].value.map(|v| v.as_f64()).unwrap();
    assert!((current - 12.0).abs() < 1e-9);
    assert_eq!(samples[1].unit, "A");
    assert!(worker.state().last_success_ms.is_some());
}

#[tokio::test(start_paused = true)]
async fn retry_bound_is_exact() {
    for retries in [1, 3, 5] {
        let config = WorkerConfig {
            retries,
            ..WorkerConfig::default()
        };
        let (mut worker, counters, _) = worker(Behavior::Refuse, meter_map(), config);
        let outcome = worker.run_cycle(far_deadline()).await;
        assert!(matches!(outcome, CycleOutcome::Failed { .. }));
        assert_eq!(counters.reads(), retries as usize);
    }
}

#[tokio::test(start_paused = true)]
async fn backoff_never_passes_next_tick() {
    let config = WorkerConfig {
        retries: 4,
        retry_backoff: Duration::from_secs(10),
        ..WorkerConfig::default()
    };
    let (mut worker, counters, _) = worker(Behavior::Refuse, meter_map(), config);
    let started = Instant::now();
    worker.run_cycle(started + Duration::from_secs(5)).await;
    assert_eq!(counters.reads(), 4);
    assert!(started.elapsed() <= Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn point_errors_are_isolated() {
    let map = Arc::new(
        PointMap::new(
            "mixed",
            DeviceInfo::default(),
            TransportDefaults::default(),
            vec![
                PointDefinition::new("A", 0, 3, DataType::Uint16),
                PointDefinition::new("Unsupported", 1, 7, DataType::Uint16),
                PointDefinition::new("Missing", 50, 3, DataType::Uint16),
                PointDefinition::new("Short", 5, 3, DataType::Uint32),
                PointDefinition::new("B", 9, 4, DataType::Int16),
            ],
        )
        .unwrap(),
    );
    let registers = HashMap::from([(0, vec![7]), (5, vec![1]), (9, vec![0xFFFF])]);
    let (mut worker, counters, sink) = worker(Behavior::Registers(registers), map, WorkerConfig::default());

    assert_eq!(worker.run_cycle(far_deadline()).await, CycleOutcome::Completed);
    // 点位级错误不重试
    assert_eq!(counters.reads(), 5);

    let samples = sink.samples();
    let summary: Vec<_> = samples
        .iter()
        .map(|s| (s.point_name.as_str(), s.quality))
        .collect();
    assert_eq!(
        summary,
        [
            ("A", Quality::Good),
            ("Unsupported", Quality::Error),
            ("Missing", Quality::Error),
            ("Short", Quality::Error),
            ("B", Quality::Good),
        ]
    );
    assert_eq!(samples[4].value, Some(SampleValue::F64(-1.0)));
    assert_eq!(worker.state().consecutive_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn out_of_range_value_is_marked_error() {
    let mut point = PointDefinition::new("Freq", 0, 3, DataType::Uint16);
    point.max_value = Some(100.0);
    let map = Arc::new(
        PointMap::new("m", DeviceInfo::default(), TransportDefaults::default(), vec![point]).unwrap(),
    );
    let (mut worker, _, sink) = worker(
        Behavior::Registers(HashMap::from([(0, vec![500])])),
        map,
        WorkerConfig::default(),
    );
    worker.run_cycle(far_deadline()).await;
    let samples = sink.samples();
    assert_eq!(samples[0].quality, Quality::Error);
    assert_eq!(samples[0].value, Some(SampleValue::F64(500.0)));
}

#[tokio::test(start_paused = true)]
async fn degraded_device_switches_to_simulated_values() {
    let config = WorkerConfig {
        retries: 1,
        degraded_threshold: 2,
        fallback: FallbackPolicy::Simulated,
        ..WorkerConfig::default()
    };
    let (mut worker, _, sink) = worker(Behavior::Refuse, meter_map(), config);

    assert_eq!(
        worker.run_cycle(far_deadline()).await,
        CycleOutcome::Failed { degraded: false }
    );
    assert_eq!(
        worker.run_cycle(far_deadline()).await,
        CycleOutcome::Failed { degraded: true }
    );

    let samples = sink.samples();
    assert_eq!(samples.len(), 4);
    assert!(samples[..2].iter().all(|s| s.quality == Quality::Error && s.value.is_none()));
    assert!(samples[2..].iter().all(|s| s.quality == Quality::Simulated && s.value.is_some()));
    assert!(worker.state().degraded);
}

#[tokio::test(start_paused = true)]
async fn hold_last_reemits_last_good_value_as_stale() {
    let config = WorkerConfig {
        retries: 1,
        degraded_threshold: 1,
        fallback: FallbackPolicy::HoldLast,
        ..WorkerConfig::default()
    };
    let (mut worker, counters, sink) = worker(Behavior::Registers(meter_registers()), meter_map(), config);

    worker.run_cycle(far_deadline()).await;
    counters.failing.store(true, Ordering::SeqCst);
    worker.run_cycle(far_deadline()).await;
    counters.failing.store(false, Ordering::SeqCst);
    assert_eq!(worker.run_cycle(far_deadline()).await, CycleOutcome::Completed);

    let samples = sink.samples();
    assert_eq!(samples.len(), 6);
    assert_eq!(samples[2].quality, Quality::Stale);
    assert_eq!(samples[2].value, samples[0].value);
    assert_eq!(samples[3].quality, Quality::Stale);
    assert!(samples[4..].iter().all(|s| s.quality == Quality::Good));
    assert!(!worker.state().degraded);
}

#[tokio::test(start_paused = true)]
async fn timing_out_device_emits_one_sample_per_point_per_interval() {
    let config = WorkerConfig {
        poll_interval: Duration::from_secs(10),
        read_timeout: Duration::from_secs(2),
        retries: 3,
        ..WorkerConfig::default()
    };
    let (worker, counters, sink) = worker(Behavior::Hang, meter_map(), config);
    let stop = CancellationToken::new();
    let cancel = CancellationToken::new();
    let started = Instant::now();
    let task = tokio::spawn(worker.run(stop.clone(), cancel.clone()));

    // tick 于 0/10/20/30 秒，每个周期 3 次尝试共约 6.6 秒
    tokio::time::sleep(Duration::from_secs(39)).await;
    cancel.cancel();
    task.await.unwrap();

    let timed = sink.timed();
    assert_eq!(timed.len(), 8);
    assert_eq!(counters.reads(), 12);
    for point in ["Voltage", "Current"] {
        let times: Vec<_> = timed
            .iter()
            .filter(|(_, s)| s.point_name == point)
            .map(|(at, _)| at.duration_since(started))
            .collect();
        assert_eq!(times.len(), 4);
        for pair in times.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_secs(10));
        }
    }
    assert!(timed
        .iter()
        .all(|(_, s)| matches!(s.quality, Quality::Error | Quality::Simulated)));
}

#[tokio::test(start_paused = true)]
async fn slow_cycles_drop_ticks_instead_of_overlapping() {
    let config = WorkerConfig {
        poll_interval: Duration::from_secs(10),
        read_timeout: Duration::from_secs(60),
        ..WorkerConfig::default()
    };
    let counters = Arc::new(Counters::default());
    let sink = Arc::new(CollectingSink::default());
    let status = StatusBoard::new();
    status
        .register(ems_poller::DeviceStatus::new("dev-1", "meter", "tcp", Duration::from_secs(10)))
        .await;
    let worker = PollWorker::new(
        "dev-1",
        Box::new(FakeClient::new(Behavior::Slow(Duration::from_secs(25)), Arc::clone(&counters))),
        meter_map(),
        config,
        sink.clone(),
        status.clone(),
    );
    let cancel = CancellationToken::new();
    let task = tokio::spawn(worker.run(CancellationToken::new(), cancel.clone()));

    tokio::time::sleep(Duration::from_secs(120)).await;
    cancel.cancel();
    task.await.unwrap();

    assert_eq!(counters.max_in_flight.load(Ordering::SeqCst), 1);
    let device = status.get("dev-1").await.unwrap();
    assert!(device.ticks_dropped > 0);
    assert!(device.cycles >= 1);
}

#[tokio::test(start_paused = true)]
async fn cancel_mid_read_closes_connection_and_stops_output() {
    let config = WorkerConfig {
        read_timeout: Duration::from_secs(60),
        ..WorkerConfig::default()
    };
    let (worker, counters, sink) = worker(Behavior::Hang, meter_map(), config);
    let cancel = CancellationToken::new();
    let task = tokio::spawn(worker.run(CancellationToken::new(), cancel.clone()));

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(counters.opens(), 1);
    assert_eq!(counters.in_flight.load(Ordering::SeqCst), 1);

    cancel.cancel();
    task.await.unwrap();
    assert_eq!(counters.opens(), counters.closes());
    assert_eq!(counters.in_flight.load(Ordering::SeqCst), 0);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(sink.samples().is_empty());
}

#[tokio::test(start_paused = true)]
async fn stop_waits_for_current_cycle() {
    let (worker, counters, sink) = worker(
        Behavior::Slow(Duration::from_secs(3)),
        meter_map(),
        WorkerConfig::default(),
    );
    let stop = CancellationToken::new();
    let task = tokio::spawn(worker.run(stop.clone(), CancellationToken::new()));

    tokio::time::sleep(Duration::from_secs(1)).await;
    stop.cancel();
    task.await.unwrap();

    // 两个点位各读一次，周期完整结束后才退出
    assert_eq!(counters.reads(), 2);
    assert_eq!(sink.samples().len(), 2);
    assert_eq!(counters.opens(), counters.closes());
}

fn assert_send<T: Send>(_: &T) {}

#[tokio::test]
async fn worker_futures_can_be_spawned() {
    let (mut worker, _, _) = worker(Behavior::Hang, meter_map(), WorkerConfig::default());
    assert_send(&worker.run_cycle(far_deadline()));
    assert_send(&worker.run(CancellationToken::new(), CancellationToken::new()));
}

/// 带量程的点表：电压 0..1000 V，频率 45..55 Hz（原始值 ×0.01）。
fn ranged_map() -> Arc<PointMap> {
    let mut voltage = PointDefinition::new("Voltage_L1", 0, 3, DataType::Float32);
    voltage.min_value = Some(0.0);
    voltage.max_value = Some(1000.0);
    let mut frequency = PointDefinition::new("Frequency", 10, 3, DataType::Uint16);
    frequency.scale = 0.01;
    frequency.min_value = Some(45.0);
    frequency.max_value = Some(55.0);
    Arc::new(
        PointMap::new(
            "analyzer",
            DeviceInfo::default(),
            TransportDefaults::default(),
            vec![voltage, frequency],
        )
        .unwrap(),
    )
}

#[tokio::test(start_paused = true)]
async fn offline_and_fallback_simulation_agree_and_stay_in_range() {
    let sink = Arc::new(CollectingSink::default());
    let mut offline = PollWorker::new(
        "dev-1",
        Box::new(SimulatedClient::new()),
        ranged_map(),
        WorkerConfig::default(),
        sink.clone(),
        StatusBoard::new(),
    );
    assert_eq!(offline.run_cycle(far_deadline()).await, CycleOutcome::Completed);
    let offline_samples = sink.samples();

    let config = WorkerConfig {
        retries: 1,
        degraded_threshold: 1,
        fallback: FallbackPolicy::Simulated,
        ..WorkerConfig::default()
    };
    let (mut degraded, _, fallback_sink) = worker(Behavior::Refuse, ranged_map(), config);
    degraded.run_cycle(far_deadline()).await;
    let fallback_samples = fallback_sink.samples();

    assert_eq!(offline_samples.len(), 2);
    assert_eq!(fallback_samples.len(), 2);
    for (live, fallback) in offline_samples.iter().zip(&fallback_samples) {
        assert_eq!(live.quality, Quality::Simulated);
        assert_eq!(fallback.quality, Quality::Simulated);
        assert_eq!(live.value, fallback.value);
    }
    let voltage = offline_samples[0].value.unwrap().as_f64();
    assert!((0.0..=1000.0).contains(&voltage), "{voltage}");
    let frequency = offline_samples[1].value.unwrap().as_f64();
    assert!((45.0..=55.0).contains(&frequency), "{frequency}");
}

#[tokio::test(start_paused = true)]
async fn non_finite_reading_is_error_without_value() {
    let registers = HashMap::from([(0, vec![0x7FC0, 0x0000]), (2, vec![12000])]);
    let (mut worker, _, sink) = worker(
        Behavior::Registers(registers),
        meter_map(),
        WorkerConfig::default(),
    );
    assert_eq!(worker.run_cycle(far_deadline()).await, CycleOutcome::Completed);

    let samples = sink.samples();
    assert_eq!(samples[0].point_name, "Voltage");
    assert_eq!(samples[0].quality, Quality::Error);
    assert_eq!(samples[0].value, None);
    assert_eq!(samples[1].quality, Quality::Good);
}

#[tokio::test(start_paused = true)]
async fn status_shows_reading_during_first_read() {
    let status = StatusBoard::new();
    status
        .register(DeviceStatus::new("dev-1", "meter", "tcp", Duration::from_secs(10)))
        .await;
    let mut worker = PollWorker::new(
        "dev-1",
        Box::new(FakeClient::new(Behavior::Hang, Arc::new(Counters::default()))),
        meter_map(),
        WorkerConfig::default(),
        Arc::new(CollectingSink::default()),
        status.clone(),
    );
    let deadline = far_deadline();
    let task = tokio::spawn(async move { worker.run_cycle(deadline).await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(status.get("dev-1").await.unwrap().phase, Phase::Reading);
    task.abort();
}
