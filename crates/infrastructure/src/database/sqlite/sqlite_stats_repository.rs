use async_trait::async_trait;
use infocache_core::models::StatsRecord;
use infocache_core::traits::StatsRepository;
use infocache_core::{CacheError, CacheResult};
use sqlx::{Row, SqlitePool};
use tracing::debug;

pub struct SqliteStatsRepository {
    pool: SqlitePool,
}

impl SqliteStatsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StatsRepository for SqliteStatsRepository {
    async fn replace(&self, stats: &StatsRecord) -> CacheResult<()> {
        let payload = serde_json::to_string(stats)
            .map_err(|e| CacheError::Serialization(format!("序列化统计汇总失败: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO stats (name, payload, computed_at) VALUES (?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                payload = excluded.payload,
                computed_at = excluded.computed_at
            "#,
        )
        .bind(&stats.name)
        .bind(payload)
        .bind(stats.computed_at)
        .execute(&self.pool)
        .await
        .map_err(CacheError::Database)?;

        debug!("替换统计汇总成功: {}", stats.name);
        Ok(())
    }

    async fn latest(&self, name: &str) -> CacheResult<Option<StatsRecord>> {
        let row = sqlx::query("SELECT payload FROM stats WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(CacheError::Database)?;

        match row {
            Some(row) => {
                let payload: String = row.try_get("payload")?;
                let stats = serde_json::from_str(&payload)
                    .map_err(|e| CacheError::Serialization(format!("解析统计汇总失败: {e}")))?;
                Ok(Some(stats))
            }
            None => Ok(None),
        }
    }
}
