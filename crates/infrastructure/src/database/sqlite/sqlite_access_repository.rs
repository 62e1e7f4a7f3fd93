use async_trait::async_trait;
use chrono::{DateTime, Utc};
use infocache_core::models::{AccessDiff, AccessEntry};
use infocache_core::traits::AccessRepository;
use infocache_core::{CacheError, CacheResult};
use sqlx::{Row, SqlitePool};
use std::collections::BTreeSet;
use tracing::debug;

pub struct SqliteAccessRepository {
    pool: SqlitePool,
}

impl SqliteAccessRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccessRepository for SqliteAccessRepository {
    async fn replace_for_queue(
        &self,
        hostname: &str,
        queue_name: &str,
        principals: &[String],
        now: DateTime<Utc>,
    ) -> CacheResult<AccessDiff> {
        let wanted: BTreeSet<&str> = principals.iter().map(String::as_str).collect();
        let mut tx = self.pool.begin().await.map_err(CacheError::Database)?;

        let existing: BTreeSet<String> = sqlx::query(
            "SELECT principal FROM access_entries WHERE hostname = ? AND queue_name = ?",
        )
        .bind(hostname)
        .bind(queue_name)
        .fetch_all(&mut *tx)
        .await
        .map_err(CacheError::Database)?
        .iter()
        .map(|row| row.try_get("principal"))
        .collect::<Result<_, _>>()?;

        let mut diff = AccessDiff::default();

        for principal in existing.iter().filter(|p| !wanted.contains(p.as_str())) {
            sqlx::query(
                "DELETE FROM access_entries WHERE hostname = ? AND queue_name = ? AND principal = ?",
            )
            .bind(hostname)
            .bind(queue_name)
            .bind(principal)
            .execute(&mut *tx)
            .await
            .map_err(CacheError::Database)?;
            diff.removed += 1;
        }

        // 只为仍然活跃的队列写入
        for principal in wanted.iter().filter(|p| !existing.contains(**p)) {
            diff.added += sqlx::query(
                r#"
                INSERT INTO access_entries (hostname, queue_name, principal, last_modified)
                SELECT ?, ?, ?, ?
                WHERE EXISTS (
                    SELECT 1 FROM queues q JOIN clusters c ON c.hostname = q.hostname
                    WHERE q.hostname = ? AND q.name = ? AND q.status = 'active' AND c.status = 'active'
                )
                "#,
            )
            .bind(hostname)
            .bind(queue_name)
            .bind(*principal)
            .bind(now)
            .bind(hostname)
            .bind(queue_name)
            .execute(&mut *tx)
            .await
            .map_err(CacheError::Database)?
            .rows_affected();
        }

        tx.commit().await.map_err(CacheError::Database)?;

        debug!(
            "替换队列授权成功: {}/{} (+{} -{})",
            hostname, queue_name, diff.added, diff.removed
        );
        Ok(diff)
    }

    async fn list_for_cluster(&self, hostname: &str) -> CacheResult<Vec<AccessEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT hostname, queue_name, principal, last_modified FROM access_entries
            WHERE hostname = ? ORDER BY queue_name, principal
            "#,
        )
        .bind(hostname)
        .fetch_all(&self.pool)
        .await
        .map_err(CacheError::Database)?;

        rows.iter()
            .map(|row| {
                Ok(AccessEntry {
                    hostname: row.try_get("hostname")?,
                    queue_name: row.try_get("queue_name")?,
                    principal: row.try_get("principal")?,
                    last_modified: row.try_get("last_modified")?,
                })
            })
            .collect()
    }
}
