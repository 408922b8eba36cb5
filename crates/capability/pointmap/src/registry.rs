//! 点表目录

use crate::error::PointMapError;
use crate::loader::{load_point_map, DocumentFormat, LoadOptions};
use domain::PointMap;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// 加载过程中出现的问题（文件级或点位级）。
#[derive(Debug)]
pub struct RegistryIssue {
    pub path: PathBuf,
    pub error: PointMapError,
}

/// 按设备类型索引的点表集合。
#[derive(Debug, Default)]
pub struct PointMapRegistry {
    maps: HashMap<String, Arc<PointMap>>,
}

impl PointMapRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 加载目录下所有点表文件，返回目录与问题列表。
    ///
    /// 同名 stem 的多个文件只保留第一个（按文件名排序）。
    pub fn load_dir(
        dir: &Path,
        options: &LoadOptions,
    ) -> Result<(Self, Vec<RegistryIssue>), PointMapError> {
        let entries = std::fs::read_dir(dir).map_err(|source| PointMapError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| path.is_file() && DocumentFormat::from_path(path).is_some())
            .collect();
        paths.sort();

        let mut registry = Self::new();
        let mut issues = Vec::new();
        for path in paths {
            match load_point_map(&path, options) {
                Ok(loaded) => {
                    let device_type = loaded.map.device_type().to_string();
                    if registry.maps.contains_key(&device_type) {
                        warn!(
                            target: "ems.pointmap",
                            path = %path.display(),
                            device_type = %device_type,
                            "point_map_shadowed",
                        );
                        continue;
                    }
                    info!(
                        target: "ems.pointmap",
                        device_type = %device_type,
                        points = loaded.map.len(),
                        rejected = loaded.rejected.len(),
                        "point_map_loaded"
                    );
                    issues.extend(loaded.rejected.into_iter().map(|error| RegistryIssue {
                        path: path.clone(),
                        error,
                    }));
                    registry.insert(loaded.map);
                }
                Err(error) => {
                    warn!(
                        target: "ems.pointmap",
                        path = %path.display(),
                        error = %error,
                        "point_map_rejected",
                    );
                    issues.push(RegistryIssue { path, error });
                }
            }
        }
        Ok((registry, issues))
    }

    pub fn insert(&mut self, map: PointMap) -> Arc<PointMap> {
        let map = Arc::new(map);
        self.maps.insert(map.device_type().to_string(), map.clone());
        map
    }

    pub fn get(&self, device_type: &str) -> Option<Arc<PointMap>> {
        self.maps.get(device_type).cloned()
    }

    pub fn device_types(&self) -> impl Iterator<Item = &str> {
        self.maps.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }
}
