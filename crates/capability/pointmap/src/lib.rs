//! 点表加载
//!
//! 读取 `<device_type>.yaml|yml|json` 点表文档，逐点校验后构建只读的
//! [`domain::PointMap`]。无效点位单独剔除并记录原因，文档级错误（无法解析、
//! 没有有效点位）使整个点表不可用。

pub mod error;
pub mod loader;
pub mod registry;

pub use error::PointMapError;
pub use loader::{
    assemble, load_point_map, parse_point_map, DocumentFormat, LoadOptions, LoadedPointMap,
};
pub use registry::{PointMapRegistry, RegistryIssue};
