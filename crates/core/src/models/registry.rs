use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::cluster::RecordStatus;

/// 注册中心元数据，每次拓扑发现后刷新
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryRecord {
    pub hostname: String,
    pub port: u16,
    pub base: String,
    pub status: RecordStatus,
    pub response_time: Option<f64>,
    pub processing_time: Option<f64>,
    pub blacklisted: bool,
    pub last_modified: DateTime<Utc>,
}
