use async_trait::async_trait;
use chrono::{DateTime, Utc};
use infocache_core::models::RegistryRecord;
use infocache_core::traits::RegistryRepository;
use infocache_core::{CacheError, CacheResult};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::database::mapping::MappingHelpers;

pub struct SqliteRegistryRepository {
    pool: SqlitePool,
}

impl SqliteRegistryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_registry(row: &sqlx::sqlite::SqliteRow) -> CacheResult<RegistryRecord> {
        Ok(RegistryRecord {
            hostname: row.try_get("hostname")?,
            port: MappingHelpers::parse_port(row, "port")?,
            base: row.try_get("base")?,
            status: row.try_get("status")?,
            response_time: row.try_get("response_time")?,
            processing_time: row.try_get("processing_time")?,
            blacklisted: row.try_get("blacklisted")?,
            last_modified: row.try_get("last_modified")?,
        })
    }
}

#[async_trait]
impl RegistryRepository for SqliteRegistryRepository {
    async fn upsert_observations(&self, registries: &[RegistryRecord]) -> CacheResult<u64> {
        let mut tx = self.pool.begin().await.map_err(CacheError::Database)?;

        for registry in registries {
            sqlx::query(
                r#"
                INSERT INTO registries (hostname, port, base, status, response_time,
                    processing_time, blacklisted, last_modified)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(hostname, port) DO UPDATE SET
                    base = excluded.base,
                    status = excluded.status,
                    response_time = excluded.response_time,
                    processing_time = excluded.processing_time,
                    blacklisted = excluded.blacklisted,
                    last_modified = excluded.last_modified
                "#,
            )
            .bind(&registry.hostname)
            .bind(i64::from(registry.port))
            .bind(&registry.base)
            .bind(registry.status)
            .bind(registry.response_time)
            .bind(registry.processing_time)
            .bind(registry.blacklisted)
            .bind(registry.last_modified)
            .execute(&mut *tx)
            .await
            .map_err(CacheError::Database)?;
        }

        tx.commit().await.map_err(CacheError::Database)?;
        debug!("更新注册中心元数据成功: {} 条", registries.len());
        Ok(registries.len() as u64)
    }

    async fn deactivate_unseen(&self, before: DateTime<Utc>) -> CacheResult<u64> {
        let result = sqlx::query(
            "UPDATE registries SET status = 'inactive' WHERE status = 'active' AND last_modified < ?",
        )
        .bind(before)
        .execute(&self.pool)
        .await
        .map_err(CacheError::Database)?;

        Ok(result.rows_affected())
    }

    async fn purge_inactive(&self, before: DateTime<Utc>) -> CacheResult<u64> {
        let result =
            sqlx::query("DELETE FROM registries WHERE status = 'inactive' AND last_modified <= ?")
                .bind(before)
                .execute(&self.pool)
                .await
                .map_err(CacheError::Database)?;

        debug!("清理不活跃注册中心: {} 条", result.rows_affected());
        Ok(result.rows_affected())
    }

    async fn list(&self) -> CacheResult<Vec<RegistryRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT hostname, port, base, status, response_time, processing_time, blacklisted,
                last_modified
            FROM registries ORDER BY hostname, port
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(CacheError::Database)?;

        rows.iter().map(Self::row_to_registry).collect()
    }
}
