//! 采集引擎共享的领域模型。
//!
//! - [`point`]：点表（PointMap）与点位定义（PointDefinition）
//! - [`data`]：解码值、工程值与 Sample
//! - [`connection`]：设备传输参数（TCP / RTU / 仿真）
//! - [`policy`]：降级输出策略、点名重复策略与轮询间隔范围

pub mod connection;
pub mod data;
pub mod point;
pub mod policy;

pub use connection::{DeviceConnection, Parity, SerialSettings, Transport, TransportKind};
pub use data::{DecodedValue, Quality, Sample, SampleValue, now_epoch_ms};
pub use point::{
    ByteOrder, DataType, DeviceInfo, DuplicatePointName, FunctionCode, PointDefinition, PointMap,
    TransportDefaults, WordOrder,
};
pub use policy::{
    DuplicatePolicy, FallbackPolicy, MAX_POLL_INTERVAL, MIN_POLL_INTERVAL, PolicyParseError,
};
