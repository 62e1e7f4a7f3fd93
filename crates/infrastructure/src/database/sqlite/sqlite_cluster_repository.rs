use async_trait::async_trait;
use chrono::{DateTime, Utc};
use infocache_core::models::{
    ChangesetSummary, ClusterChangeset, ClusterRecord, DeactivationSummary, JobRecord,
    QueueRecord, RecordStatus,
};
use infocache_core::traits::ClusterRepository;
use infocache_core::{CacheError, CacheResult};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tracing::debug;

use crate::database::mapping::MappingHelpers;

/// 已解决作业状态，作业写入不得覆盖这些记录
pub(crate) const RESOLVED_STATUS_SQL: &str = "('FIN_FETCHED', 'FIN_DELETED', 'FLD_FETCHED', 'FLD_DELETED', 'KIL_FETCHED', 'KIL_DELETED', 'LOST')";

const CLUSTER_COLUMNS: &str = "hostname, alias, endpoint_host, endpoint_port, status, response_time, processing_time, blacklisted, total_cpus, used_cpus, total_jobs, attributes, access_synced_at, last_modified";

pub struct SqliteClusterRepository {
    pool: SqlitePool,
}

impl SqliteClusterRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_cluster(row: &sqlx::sqlite::SqliteRow) -> CacheResult<ClusterRecord> {
        Ok(ClusterRecord {
            hostname: row.try_get("hostname")?,
            alias: row.try_get("alias")?,
            endpoint_host: row.try_get("endpoint_host")?,
            endpoint_port: MappingHelpers::parse_port(row, "endpoint_port")?,
            status: row.try_get("status")?,
            response_time: row.try_get("response_time")?,
            processing_time: row.try_get("processing_time")?,
            blacklisted: row.try_get("blacklisted")?,
            total_cpus: row.try_get("total_cpus")?,
            used_cpus: row.try_get("used_cpus")?,
            total_jobs: row.try_get("total_jobs")?,
            attributes: MappingHelpers::parse_attributes(row, "attributes")?,
            access_synced_at: row.try_get("access_synced_at")?,
            last_modified: row.try_get("last_modified")?,
        })
    }

    async fn fetch_where(
        &self,
        predicate: &str,
        at: Option<DateTime<Utc>>,
    ) -> CacheResult<Vec<ClusterRecord>> {
        let sql = format!("SELECT {CLUSTER_COLUMNS} FROM clusters WHERE {predicate} ORDER BY hostname");
        let mut query = sqlx::query(&sql);
        if let Some(at) = at {
            query = query.bind(at);
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(CacheError::Database)?;

        rows.iter().map(Self::row_to_cluster).collect()
    }

    async fn upsert_cluster(
        tx: &mut Transaction<'_, Sqlite>,
        cluster: &ClusterRecord,
    ) -> CacheResult<()> {
        let attributes = MappingHelpers::encode_attributes(&cluster.attributes)?;

        sqlx::query(
            r#"
            INSERT INTO clusters (hostname, alias, endpoint_host, endpoint_port, status, response_time,
                processing_time, blacklisted, total_cpus, used_cpus, total_jobs, attributes,
                access_synced_at, last_modified)
            VALUES (?, ?, ?, ?, 'active', ?, ?, 0, ?, ?, ?, ?, NULL, ?)
            ON CONFLICT(hostname) DO UPDATE SET
                alias = excluded.alias,
                endpoint_host = excluded.endpoint_host,
                endpoint_port = excluded.endpoint_port,
                status = 'active',
                response_time = excluded.response_time,
                processing_time = excluded.processing_time,
                blacklisted = 0,
                total_cpus = excluded.total_cpus,
                used_cpus = excluded.used_cpus,
                total_jobs = excluded.total_jobs,
                attributes = excluded.attributes,
                access_synced_at = CASE WHEN clusters.status = 'active'
                    THEN clusters.access_synced_at ELSE NULL END,
                last_modified = excluded.last_modified
            "#,
        )
        .bind(&cluster.hostname)
        .bind(&cluster.alias)
        .bind(&cluster.endpoint_host)
        .bind(i64::from(cluster.endpoint_port))
        .bind(cluster.response_time)
        .bind(cluster.processing_time)
        .bind(cluster.total_cpus)
        .bind(cluster.used_cpus)
        .bind(cluster.total_jobs)
        .bind(attributes)
        .bind(cluster.last_modified)
        .execute(&mut **tx)
        .await
        .map_err(CacheError::Database)?;

        Ok(())
    }

    async fn upsert_queue(tx: &mut Transaction<'_, Sqlite>, queue: &QueueRecord) -> CacheResult<()> {
        let attributes = MappingHelpers::encode_attributes(&queue.attributes)?;

        sqlx::query(
            r#"
            INSERT INTO queues (hostname, name, status, running, grid_running, grid_queued,
                local_queued, prelrms_queued, total_cpus, attributes, last_modified)
            VALUES (?, ?, 'active', ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(hostname, name) DO UPDATE SET
                status = 'active',
                running = excluded.running,
                grid_running = excluded.grid_running,
                grid_queued = excluded.grid_queued,
                local_queued = excluded.local_queued,
                prelrms_queued = excluded.prelrms_queued,
                total_cpus = excluded.total_cpus,
                attributes = excluded.attributes,
                last_modified = excluded.last_modified
            "#,
        )
        .bind(&queue.hostname)
        .bind(&queue.name)
        .bind(queue.running)
        .bind(queue.grid_running)
        .bind(queue.grid_queued)
        .bind(queue.local_queued)
        .bind(queue.prelrms_queued)
        .bind(queue.total_cpus)
        .bind(attributes)
        .bind(queue.last_modified)
        .execute(&mut **tx)
        .await
        .map_err(CacheError::Database)?;

        Ok(())
    }

    /// 返回是否实际写入，目标记录已解决时不写入
    async fn upsert_job(tx: &mut Transaction<'_, Sqlite>, job: &JobRecord) -> CacheResult<bool> {
        let d = &job.details;
        let sql = format!(
            r#"
            INSERT INTO jobs (global_id, status, source_status, owner, job_name, cluster_name,
                queue_name, exit_code, cpu_count, submission_time, completion_time,
                session_erase_time, proxy_expiration_time, used_cpu_time, used_wall_time,
                req_cpu_time, req_wall_time, submission_ui, rerun_count, last_modified)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(global_id) DO UPDATE SET
                status = excluded.status,
                source_status = excluded.source_status,
                owner = excluded.owner,
                job_name = excluded.job_name,
                cluster_name = excluded.cluster_name,
                queue_name = excluded.queue_name,
                exit_code = excluded.exit_code,
                cpu_count = excluded.cpu_count,
                submission_time = excluded.submission_time,
                completion_time = excluded.completion_time,
                session_erase_time = excluded.session_erase_time,
                proxy_expiration_time = excluded.proxy_expiration_time,
                used_cpu_time = excluded.used_cpu_time,
                used_wall_time = excluded.used_wall_time,
                req_cpu_time = excluded.req_cpu_time,
                req_wall_time = excluded.req_wall_time,
                submission_ui = excluded.submission_ui,
                rerun_count = excluded.rerun_count,
                last_modified = excluded.last_modified
            WHERE jobs.status NOT IN {RESOLVED_STATUS_SQL}
            "#
        );

        let result = sqlx::query(&sql)
            .bind(&job.global_id)
            .bind(job.status)
            .bind(&job.source_status)
            .bind(&d.owner)
            .bind(&d.job_name)
            .bind(&d.cluster_name)
            .bind(&d.queue_name)
            .bind(d.exit_code)
            .bind(d.cpu_count)
            .bind(d.submission_time)
            .bind(d.completion_time)
            .bind(d.session_erase_time)
            .bind(d.proxy_expiration_time)
            .bind(d.used_cpu_time)
            .bind(d.used_wall_time)
            .bind(d.req_cpu_time)
            .bind(d.req_wall_time)
            .bind(&d.submission_ui)
            .bind(job.rerun_count)
            .bind(job.last_modified)
            .execute(&mut **tx)
            .await
            .map_err(CacheError::Database)?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ClusterRepository for SqliteClusterRepository {
    async fn apply_changeset(&self, changeset: &ClusterChangeset) -> CacheResult<ChangesetSummary> {
        let hostname = changeset.hostname();
        let now = changeset.cluster.last_modified;
        let mut tx = self.pool.begin().await.map_err(CacheError::Database)?;

        let previous = sqlx::query("SELECT status FROM clusters WHERE hostname = ?")
            .bind(hostname)
            .fetch_optional(&mut *tx)
            .await
            .map_err(CacheError::Database)?;
        let previous: Option<RecordStatus> = match previous {
            Some(row) => Some(row.try_get("status")?),
            None => None,
        };

        let mut summary = ChangesetSummary {
            reactivated: previous != Some(RecordStatus::Active),
            ..ChangesetSummary::default()
        };

        Self::upsert_cluster(&mut tx, &changeset.cluster).await?;

        for queue in &changeset.queues {
            Self::upsert_queue(&mut tx, queue).await?;
            summary.queues_written += 1;
        }

        let present = MappingHelpers::encode_name_list(&changeset.present_queues)?;
        summary.queues_deactivated = sqlx::query(
            r#"
            UPDATE queues SET status = 'inactive', last_modified = ?
            WHERE hostname = ? AND status = 'active'
                AND name NOT IN (SELECT value FROM json_each(?))
            "#,
        )
        .bind(now)
        .bind(hostname)
        .bind(&present)
        .execute(&mut *tx)
        .await
        .map_err(CacheError::Database)?
        .rows_affected();

        sqlx::query(
            r#"
            DELETE FROM access_entries
            WHERE hostname = ? AND queue_name NOT IN (SELECT value FROM json_each(?))
            "#,
        )
        .bind(hostname)
        .bind(&present)
        .execute(&mut *tx)
        .await
        .map_err(CacheError::Database)?;

        for job in &changeset.job_writes {
            if Self::upsert_job(&mut tx, job).await? {
                summary.jobs_written += 1;
            } else {
                summary.jobs_refused += 1;
            }
        }

        tx.commit().await.map_err(CacheError::Database)?;

        debug!(
            "提交集群变更成功: {} (队列 {}, 作业 {}, 拒绝 {})",
            hostname, summary.queues_written, summary.jobs_written, summary.jobs_refused
        );
        Ok(summary)
    }

    async fn deactivate(
        &self,
        hostname: &str,
        blacklisted: bool,
        now: DateTime<Utc>,
    ) -> CacheResult<DeactivationSummary> {
        let mut tx = self.pool.begin().await.map_err(CacheError::Database)?;

        let row = sqlx::query("SELECT status FROM clusters WHERE hostname = ?")
            .bind(hostname)
            .fetch_optional(&mut *tx)
            .await
            .map_err(CacheError::Database)?
            .ok_or_else(|| CacheError::ClusterNotFound {
                hostname: hostname.to_string(),
            })?;
        let status: RecordStatus = row.try_get("status")?;

        sqlx::query(
            r#"
            UPDATE clusters SET
                status = 'inactive',
                blacklisted = ?,
                last_modified = CASE WHEN status = 'active' THEN ? ELSE last_modified END
            WHERE hostname = ?
            "#,
        )
        .bind(blacklisted)
        .bind(now)
        .bind(hostname)
        .execute(&mut *tx)
        .await
        .map_err(CacheError::Database)?;

        let queues_deactivated = sqlx::query(
            "UPDATE queues SET status = 'inactive', last_modified = ? WHERE hostname = ? AND status = 'active'",
        )
        .bind(now)
        .bind(hostname)
        .execute(&mut *tx)
        .await
        .map_err(CacheError::Database)?
        .rows_affected();

        let access_entries_removed = sqlx::query("DELETE FROM access_entries WHERE hostname = ?")
            .bind(hostname)
            .execute(&mut *tx)
            .await
            .map_err(CacheError::Database)?
            .rows_affected();

        tx.commit().await.map_err(CacheError::Database)?;

        debug!("集群下线成功: {}", hostname);
        Ok(DeactivationSummary {
            cluster_deactivated: status == RecordStatus::Active,
            queues_deactivated,
            access_entries_removed,
        })
    }

    async fn get(&self, hostname: &str) -> CacheResult<Option<ClusterRecord>> {
        let sql = format!("SELECT {CLUSTER_COLUMNS} FROM clusters WHERE hostname = ?");
        let row = sqlx::query(&sql)
            .bind(hostname)
            .fetch_optional(&self.pool)
            .await
            .map_err(CacheError::Database)?;

        row.as_ref().map(Self::row_to_cluster).transpose()
    }

    async fn list_active(&self) -> CacheResult<Vec<ClusterRecord>> {
        self.fetch_where("status = 'active'", None).await
    }

    async fn list_stale_active(&self, before: DateTime<Utc>) -> CacheResult<Vec<ClusterRecord>> {
        self.fetch_where("status = 'active' AND last_modified < ?", Some(before))
            .await
    }

    async fn list_pending_access_sync(&self) -> CacheResult<Vec<ClusterRecord>> {
        self.fetch_where("status = 'active' AND access_synced_at IS NULL", None)
            .await
    }

    async fn mark_access_synced(&self, hostname: &str, at: DateTime<Utc>) -> CacheResult<()> {
        let result = sqlx::query("UPDATE clusters SET access_synced_at = ? WHERE hostname = ?")
            .bind(at)
            .bind(hostname)
            .execute(&self.pool)
            .await
            .map_err(CacheError::Database)?;

        if result.rows_affected() == 0 {
            return Err(CacheError::ClusterNotFound {
                hostname: hostname.to_string(),
            });
        }
        Ok(())
    }

    async fn purge_inactive(&self, before: DateTime<Utc>) -> CacheResult<u64> {
        let result =
            sqlx::query("DELETE FROM clusters WHERE status = 'inactive' AND last_modified <= ?")
                .bind(before)
                .execute(&self.pool)
                .await
                .map_err(CacheError::Database)?;

        debug!("清理不活跃集群: {} 条", result.rows_affected());
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::sqlite::test_support::{cluster, job, pool, queue};
    use crate::database::sqlite::{SqliteAccessRepository, SqliteJobRepository};
    use chrono::Duration;
    use infocache_core::models::{JobStatus, RESOLVED_STATUSES};
    use infocache_core::traits::{AccessRepository, JobRepository};

    fn changeset(hostname: &str, queues: &[&str], now: DateTime<Utc>) -> ClusterChangeset {
        queues.iter().fold(
            ClusterChangeset::new(cluster(hostname, now)),
            |changeset, name| changeset.with_queue(queue(hostname, name, now)),
        )
    }

    #[test]
    fn test_resolved_status_sql_matches_model() {
        for status in RESOLVED_STATUSES {
            assert!(RESOLVED_STATUS_SQL.contains(&format!("'{}'", status.as_str())));
        }
        assert_eq!(RESOLVED_STATUS_SQL.matches('\'').count(), RESOLVED_STATUSES.len() * 2);
    }

    #[tokio::test]
    async fn test_apply_changeset_roundtrip() {
        let pool = pool().await;
        let repo = SqliteClusterRepository::new(pool);
        let now = Utc::now();

        let summary = repo
            .apply_changeset(&changeset("c1.example.org", &["short", "long"], now))
            .await
            .unwrap();
        assert!(summary.reactivated);
        assert_eq!(summary.queues_written, 2);

        let stored = repo.get("c1.example.org").await.unwrap().unwrap();
        assert_eq!(stored.total_cpus, 128);
        assert_eq!(stored.alias.as_deref(), Some("c1.example.org alias"));
        assert_eq!(
            stored.attributes.get("nordugrid-cluster-lrms-type"),
            Some(&vec!["SLURM".to_string()])
        );
        assert!(stored.is_active());
        assert!(stored.access_synced_at.is_none());

        let again = repo
            .apply_changeset(&changeset("c1.example.org", &["short", "long"], now))
            .await
            .unwrap();
        assert!(!again.reactivated);
    }

    #[tokio::test]
    async fn test_missing_queue_is_deactivated() {
        let pool = pool().await;
        let repo = SqliteClusterRepository::new(pool.clone());
        let access = SqliteAccessRepository::new(pool.clone());
        let now = Utc::now();

        repo.apply_changeset(&changeset("c1.example.org", &["short", "long"], now))
            .await
            .unwrap();
        access
            .replace_for_queue("c1.example.org", "long", &["/CN=Bob".to_string()], now)
            .await
            .unwrap();

        let later = now + Duration::minutes(2);
        let summary = repo
            .apply_changeset(&changeset("c1.example.org", &["short"], later))
            .await
            .unwrap();
        assert_eq!(summary.queues_deactivated, 1);
        assert!(access.list_for_cluster("c1.example.org").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_job_upsert_refuses_resolved_records() {
        let pool = pool().await;
        let repo = SqliteClusterRepository::new(pool.clone());
        let jobs = SqliteJobRepository::new(pool);
        let now = Utc::now();

        let mut first = changeset("c1.example.org", &["batch"], now);
        first.job_writes = vec![job("job-1", "c1.example.org", "batch", JobStatus::FinFetched, now)];
        repo.apply_changeset(&first).await.unwrap();

        let mut second = changeset("c1.example.org", &["batch"], now);
        second.job_writes = vec![job("job-1", "c1.example.org", "batch", JobStatus::Running, now)];
        let summary = repo.apply_changeset(&second).await.unwrap();

        assert_eq!(summary.jobs_written, 0);
        assert_eq!(summary.jobs_refused, 1);
        let stored = jobs.get("job-1").await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::FinFetched);
    }

    #[tokio::test]
    async fn test_deactivation_cascade() {
        let pool = pool().await;
        let repo = SqliteClusterRepository::new(pool.clone());
        let access = SqliteAccessRepository::new(pool.clone());
        let now = Utc::now();

        repo.apply_changeset(&changeset("c1.example.org", &["short", "long"], now))
            .await
            .unwrap();
        access
            .replace_for_queue(
                "c1.example.org",
                "short",
                &["/CN=Alice".to_string(), "/CN=Bob".to_string()],
                now,
            )
            .await
            .unwrap();

        let later = now + Duration::minutes(5);
        let summary = repo.deactivate("c1.example.org", true, later).await.unwrap();
        assert!(summary.cluster_deactivated);
        assert_eq!(summary.queues_deactivated, 2);
        assert_eq!(summary.access_entries_removed, 2);

        let stored = repo.get("c1.example.org").await.unwrap().unwrap();
        assert_eq!(stored.status, RecordStatus::Inactive);
        assert!(stored.blacklisted);
        assert_eq!(stored.last_modified, later);
        assert!(repo.list_active().await.unwrap().is_empty());

        // 重新出现时授权同步标记被清空
        repo.mark_access_synced("c1.example.org", later).await.unwrap();
        let back = repo
            .apply_changeset(&changeset("c1.example.org", &["short"], later))
            .await
            .unwrap();
        assert!(back.reactivated);
        let pending = repo.list_pending_access_sync().await.unwrap();
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn test_deactivate_unknown_cluster() {
        let repo = SqliteClusterRepository::new(pool().await);
        let result = repo.deactivate("nowhere.example.org", false, Utc::now()).await;
        assert!(matches!(result, Err(CacheError::ClusterNotFound { .. })));
    }

    #[tokio::test]
    async fn test_stale_and_purge_boundaries() {
        let pool = pool().await;
        let repo = SqliteClusterRepository::new(pool);
        let now = Utc::now();
        let earlier = now - Duration::minutes(10);

        repo.apply_changeset(&changeset("old.example.org", &["q"], earlier))
            .await
            .unwrap();
        repo.apply_changeset(&changeset("new.example.org", &["q"], now))
            .await
            .unwrap();

        let stale = repo.list_stale_active(now).await.unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].hostname, "old.example.org");

        repo.deactivate("old.example.org", false, earlier).await.unwrap();
        assert_eq!(repo.purge_inactive(earlier - Duration::seconds(1)).await.unwrap(), 0);
        assert_eq!(repo.purge_inactive(earlier).await.unwrap(), 1);
        assert!(repo.get("old.example.org").await.unwrap().is_none());
        assert!(repo.get("new.example.org").await.unwrap().is_some());
    }
}
