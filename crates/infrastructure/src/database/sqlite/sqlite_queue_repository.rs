use async_trait::async_trait;
use infocache_core::models::QueueRecord;
use infocache_core::traits::QueueRepository;
use infocache_core::{CacheError, CacheResult};
use sqlx::{Row, SqlitePool};

use crate::database::mapping::MappingHelpers;

const QUEUE_COLUMNS: &str = "hostname, name, status, running, grid_running, grid_queued, local_queued, prelrms_queued, total_cpus, attributes, last_modified";

pub struct SqliteQueueRepository {
    pool: SqlitePool,
}

impl SqliteQueueRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_queue(row: &sqlx::sqlite::SqliteRow) -> CacheResult<QueueRecord> {
        Ok(QueueRecord {
            hostname: row.try_get("hostname")?,
            name: row.try_get("name")?,
            status: row.try_get("status")?,
            running: row.try_get("running")?,
            grid_running: row.try_get("grid_running")?,
            grid_queued: row.try_get("grid_queued")?,
            local_queued: row.try_get("local_queued")?,
            prelrms_queued: row.try_get("prelrms_queued")?,
            total_cpus: row.try_get("total_cpus")?,
            attributes: MappingHelpers::parse_attributes(row, "attributes")?,
            last_modified: row.try_get("last_modified")?,
        })
    }
}

#[async_trait]
impl QueueRepository for SqliteQueueRepository {
    async fn list_for_cluster(&self, hostname: &str) -> CacheResult<Vec<QueueRecord>> {
        let sql = format!("SELECT {QUEUE_COLUMNS} FROM queues WHERE hostname = ? ORDER BY name");
        let rows = sqlx::query(&sql)
            .bind(hostname)
            .fetch_all(&self.pool)
            .await
            .map_err(CacheError::Database)?;

        rows.iter().map(Self::row_to_queue).collect()
    }

    async fn list_active(&self) -> CacheResult<Vec<QueueRecord>> {
        let sql = format!(
            "SELECT {QUEUE_COLUMNS} FROM queues WHERE status = 'active' ORDER BY hostname, name"
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(CacheError::Database)?;

        rows.iter().map(Self::row_to_queue).collect()
    }
}
