#![allow(dead_code)]

use async_trait::async_trait;
use domain::{
    DataType, DeviceConnection, DeviceInfo, PointDefinition, PointMap, Sample, Transport,
    TransportDefaults, TransportKind,
};
use ems_pipeline::{PipelineError, SampleSink};
use ems_poller::{ClientFactory, DeviceSpec};
use ems_protocol::{ProtocolClient, ProtocolError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// 假传输的行为。
#[derive(Clone)]
pub enum Behavior {
    /// 按地址返回固定寄存器值
    Registers(HashMap<u16, Vec<u16>>),
    /// 永不返回
    Hang,
    /// 连接被拒绝
    Refuse,
    /// 延迟后返回全零
    Slow(Duration),
}

#[derive(Default)]
pub struct Counters {
    pub reads: AtomicUsize,
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    /// 置位后所有读取都被拒绝
    pub failing: AtomicBool,
}

impl Counters {
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

struct InFlight(Arc<Counters>);

impl InFlight {
    fn enter(counters: &Arc<Counters>) -> Self {
        let now = counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        counters.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(Arc::clone(counters))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// 记录开/关连接次数的假客户端。
pub struct FakeClient {
    behavior: Behavior,
    counters: Arc<Counters>,
    connected: bool,
}

impl FakeClient {
    pub fn new(behavior: Behavior, counters: Arc<Counters>) -> Self {
        Self {
            behavior,
            counters,
            connected: false,
        }
    }

    fn drop_connection(&mut self) {
        if self.connected {
            self.connected = false;
            self.counters.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl ProtocolClient for FakeClient {
    async fn read(
        &mut self,
        function_code: u8,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, ProtocolError> {
        self.counters.reads.fetch_add(1, Ordering::SeqCst);
        let _guard = InFlight::enter(&self.counters);
        if function_code > 4 || function_code == 0 {
            return Err(ProtocolError::UnsupportedOperation(function_code));
        }
        if self.counters.failing.load(Ordering::SeqCst) {
            self.drop_connection();
            return Err(ProtocolError::Connection("connection refused".into()));
        }
        match &self.behavior {
            Behavior::Refuse => Err(ProtocolError::Connection("connection refused".into())),
            behavior => {
                if !self.connected {
                    self.connected = true;
                    self.counters.opens.fetch_add(1, Ordering::SeqCst);
                }
                match behavior {
                    Behavior::Registers(map) => match map.get(&address) {
                        Some(words) => Ok(words.clone()),
                        None => Err(ProtocolError::Exception("IllegalDataAddress".into())),
                    },
                    Behavior::Hang => {
                        std::future::pending::<()>().await;
                        Ok(vec![0; usize::from(count)])
                    }
                    Behavior::Slow(delay) => {
                        tokio::time::sleep(*delay).await;
                        Ok(vec![0; usize::from(count)])
                    }
                    Behavior::Refuse => unreachable!(),
                }
            }
        }
    }

    async fn close(&mut self) {
        self.drop_connection();
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Tcp
    }
}

/// 为每个新 Worker 创建共享计数器的假客户端。
pub struct FakeFactory {
    pub behavior: Behavior,
    pub counters: Arc<Counters>,
    pub created: AtomicUsize,
}

impl FakeFactory {
    pub fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            counters: Arc::new(Counters::default()),
            created: AtomicUsize::new(0),
        })
    }
}

impl ClientFactory for FakeFactory {
    fn create(&self, _spec: &DeviceSpec) -> Box<dyn ProtocolClient> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Box::new(FakeClient::new(self.behavior.clone(), Arc::clone(&self.counters)))
    }
}

/// 收集 Sample 及其到达时刻。
#[derive(Default)]
pub struct CollectingSink {
    pub samples: Mutex<Vec<(Instant, Sample)>>,
}

impl CollectingSink {
    pub fn samples(&self) -> Vec<Sample> {
        self.samples
            .lock()
            .unwrap()
            .iter()
            .map(|(_, sample)| sample.clone())
            .collect()
    }

    pub fn timed(&self) -> Vec<(Instant, Sample)> {
        self.samples.lock().unwrap().clone()
    }
}

#[async_trait]
impl SampleSink for CollectingSink {
    async fn emit(&self, sample: Sample) -> Result<(), PipelineError> {
        self.samples.lock().unwrap().push((Instant::now(), sample));
        Ok(())
    }
}

/// 两个点位的电表点表：Voltage (float32 @0)、Current (uint16 mA @2)。
pub fn meter_map() -> Arc<PointMap> {
    let voltage = PointDefinition::new("Voltage", 0, 3, DataType::Float32);
    let mut current = PointDefinition::new("Current", 2, 3, DataType::Uint16);
    current.unit = "A".to_string();
    current.source_unit = "mA".to_string();
    current.unit_factor = 0.001;
    Arc::new(
        PointMap::new(
            "meter",
            DeviceInfo::default(),
            TransportDefaults::default(),
            vec![voltage, current],
        )
        .unwrap(),
    )
}

pub fn meter_registers() -> HashMap<u16, Vec<u16>> {
    HashMap::from([(0, vec![0x4248, 0x4000]), (2, vec![12000])])
}

pub fn connection(timeout_ms: u64, retries: u32) -> DeviceConnection {
    DeviceConnection {
        transport: Transport::Tcp {
            host: "127.0.0.1".to_string(),
            port: 502,
        },
        unit_id: 1,
        timeout_ms,
        retries,
    }
}

pub fn spec(device_id: &str, interval: Duration, timeout_ms: u64, retries: u32) -> DeviceSpec {
    DeviceSpec {
        device_id: device_id.to_string(),
        connection: connection(timeout_ms, retries),
        poll_interval: interval,
        fallback: None,
        point_map: meter_map(),
    }
}
