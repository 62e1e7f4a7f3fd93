use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::{CacheError, CacheResult};
use crate::models::directory::DirectoryRecord;
use crate::models::endpoint::EndpointId;
use crate::models::fields::{collect_known, ClusterField, FieldValue, RecordField};

/// 多值属性集合，按属性名存储
pub type AttributeBag = BTreeMap<String, Vec<String>>;

/// 集群/队列/注册中心记录状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RecordStatus {
    #[serde(rename = "active")]
    Active,
    #[serde(rename = "inactive")]
    Inactive,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Active => "active",
            RecordStatus::Inactive => "inactive",
        }
    }
}

impl sqlx::Type<sqlx::Sqlite> for RecordStatus {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <&str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for RecordStatus {
    fn decode(value: <sqlx::Sqlite as sqlx::Database>::ValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        match s {
            "active" => Ok(RecordStatus::Active),
            "inactive" => Ok(RecordStatus::Inactive),
            _ => Err(format!("Invalid record status: {s}").into()),
        }
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for RecordStatus {
    fn encode_by_ref(
        &self,
        buf: &mut <sqlx::Sqlite as sqlx::Database>::ArgumentBuffer<'q>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str(), buf)
    }
}

/// 集群记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterRecord {
    pub hostname: String,
    pub alias: Option<String>,
    /// 轮询该集群使用的端点
    pub endpoint_host: String,
    pub endpoint_port: u16,
    pub status: RecordStatus,
    pub response_time: Option<f64>,
    pub processing_time: Option<f64>,
    pub blacklisted: bool,
    pub total_cpus: i64,
    pub used_cpus: i64,
    pub total_jobs: i64,
    pub attributes: AttributeBag,
    /// 授权列表最近一次同步时间，集群重新激活时清空
    pub access_synced_at: Option<DateTime<Utc>>,
    pub last_modified: DateTime<Utc>,
}

impl ClusterRecord {
    /// 从目录中的集群对象构造活跃记录
    pub fn from_directory(
        record: &DirectoryRecord,
        endpoint: &EndpointId,
        now: DateTime<Utc>,
    ) -> CacheResult<Self> {
        let hostname = record
            .first(ClusterField::Name.attribute())
            .map(|name| name.trim().to_ascii_lowercase())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                CacheError::Schema(format!("集群对象缺少名称: {}", record.dn))
            })?;

        let attributes = collect_known::<ClusterField>(&record.attributes);
        let counter = |field: ClusterField| -> i64 {
            field
                .kind()
                .parse(record.values(field.attribute()))
                .and_then(|v| v.as_i64())
                .unwrap_or(0)
                .max(0)
        };

        Ok(Self {
            alias: record
                .first(ClusterField::Alias.attribute())
                .map(str::to_string),
            endpoint_host: endpoint.host.clone(),
            endpoint_port: endpoint.port,
            status: RecordStatus::Active,
            response_time: None,
            processing_time: None,
            blacklisted: false,
            total_cpus: counter(ClusterField::TotalCpus),
            used_cpus: counter(ClusterField::UsedCpus),
            total_jobs: counter(ClusterField::TotalJobs),
            attributes,
            access_synced_at: None,
            last_modified: now,
            hostname,
        })
    }

    pub fn endpoint(&self) -> EndpointId {
        EndpointId::new(self.endpoint_host.clone(), self.endpoint_port)
    }

    pub fn is_active(&self) -> bool {
        self.status == RecordStatus::Active
    }

    /// 按字段取值
    pub fn get(&self, field: ClusterField) -> Option<FieldValue> {
        match field {
            ClusterField::Name => Some(FieldValue::Text(self.hostname.clone())),
            ClusterField::Alias => self.alias.clone().map(FieldValue::Text),
            ClusterField::TotalCpus => Some(FieldValue::Integer(self.total_cpus)),
            ClusterField::UsedCpus => Some(FieldValue::Integer(self.used_cpus)),
            ClusterField::TotalJobs => Some(FieldValue::Integer(self.total_jobs)),
            other => self
                .attributes
                .get(other.attribute())
                .and_then(|values| other.kind().parse(values)),
        }
    }
}
