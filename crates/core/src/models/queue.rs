use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{CacheError, CacheResult};
use crate::models::cluster::{AttributeBag, RecordStatus};
use crate::models::directory::DirectoryRecord;
use crate::models::fields::{collect_known, FieldValue, QueueField, RecordField};

/// 队列记录，主键 (hostname, name)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueRecord {
    pub hostname: String,
    pub name: String,
    pub status: RecordStatus,
    pub running: i64,
    pub grid_running: i64,
    pub grid_queued: i64,
    pub local_queued: i64,
    pub prelrms_queued: i64,
    pub total_cpus: i64,
    pub attributes: AttributeBag,
    pub last_modified: DateTime<Utc>,
}

impl QueueRecord {
    /// 从目录中的队列对象构造活跃记录
    pub fn from_directory(
        record: &DirectoryRecord,
        hostname: &str,
        now: DateTime<Utc>,
    ) -> CacheResult<Self> {
        let name = record
            .first(QueueField::Name.attribute())
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| CacheError::Schema(format!("队列对象缺少名称: {}", record.dn)))?
            .to_string();

        let counter = |field: QueueField| -> CacheResult<i64> {
            let values = record.values(field.attribute());
            if values.is_empty() {
                return Ok(0);
            }
            field
                .kind()
                .parse(values)
                .and_then(|v| v.as_i64())
                .map(|v| v.max(0))
                .ok_or_else(|| {
                    CacheError::Schema(format!(
                        "队列 {name} 的属性 {} 无法解析: {:?}",
                        field.attribute(),
                        values
                    ))
                })
        };

        Ok(Self {
            hostname: hostname.to_string(),
            status: RecordStatus::Active,
            running: counter(QueueField::Running)?,
            grid_running: counter(QueueField::GridRunning)?,
            grid_queued: counter(QueueField::GridQueued)?,
            local_queued: counter(QueueField::LocalQueued)?,
            prelrms_queued: counter(QueueField::PrelrmsQueued)?,
            total_cpus: counter(QueueField::TotalCpus)?,
            attributes: collect_known::<QueueField>(&record.attributes),
            last_modified: now,
            name,
        })
    }

    pub fn is_active(&self) -> bool {
        self.status == RecordStatus::Active
    }

    /// 按字段取值
    pub fn get(&self, field: QueueField) -> Option<FieldValue> {
        match field {
            QueueField::Name => Some(FieldValue::Text(self.name.clone())),
            QueueField::Running => Some(FieldValue::Integer(self.running)),
            QueueField::GridRunning => Some(FieldValue::Integer(self.grid_running)),
            QueueField::GridQueued => Some(FieldValue::Integer(self.grid_queued)),
            QueueField::LocalQueued => Some(FieldValue::Integer(self.local_queued)),
            QueueField::PrelrmsQueued => Some(FieldValue::Integer(self.prelrms_queued)),
            QueueField::TotalCpus => Some(FieldValue::Integer(self.total_cpus)),
            other => self
                .attributes
                .get(other.attribute())
                .and_then(|values| other.kind().parse(values)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::schema::queue_dn;

    #[test]
    fn test_from_directory() {
        let record = DirectoryRecord::new(queue_dn("c1.example.org", "batch"))
            .with("nordugrid-queue-name", "batch")
            .with("nordugrid-queue-status", "active")
            .with("nordugrid-queue-running", "12")
            .with("nordugrid-queue-gridqueued", "3")
            .with("nordugrid-queue-maxwalltime", "2880");

        let queue = QueueRecord::from_directory(&record, "c1.example.org", Utc::now()).unwrap();
        assert_eq!(queue.name, "batch");
        assert_eq!(queue.running, 12);
        assert_eq!(queue.grid_queued, 3);
        assert_eq!(queue.local_queued, 0);
        assert_eq!(queue.get(QueueField::MaxWallTime), Some(FieldValue::Integer(2880)));
        assert_eq!(
            queue.get(QueueField::Status),
            Some(FieldValue::Text("active".to_string()))
        );
    }

    #[test]
    fn test_malformed_counter_is_schema_error() {
        let record = DirectoryRecord::new(queue_dn("c1.example.org", "batch"))
            .with("nordugrid-queue-name", "batch")
            .with("nordugrid-queue-running", "lots");

        let result = QueueRecord::from_directory(&record, "c1.example.org", Utc::now());
        assert!(matches!(result, Err(CacheError::Schema(_))));
    }
}
