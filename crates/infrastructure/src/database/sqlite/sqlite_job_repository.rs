use async_trait::async_trait;
use chrono::{DateTime, Utc};
use infocache_core::models::{CompletedJobUsage, JobDetails, JobRecord, JobStatus};
use infocache_core::traits::JobRepository;
use infocache_core::{CacheError, CacheResult};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use super::sqlite_cluster_repository::RESOLVED_STATUS_SQL;

const JOB_COLUMNS: &str = "global_id, status, source_status, owner, job_name, cluster_name, queue_name, exit_code, cpu_count, submission_time, completion_time, session_erase_time, proxy_expiration_time, used_cpu_time, used_wall_time, req_cpu_time, req_wall_time, submission_ui, rerun_count, last_modified";

pub struct SqliteJobRepository {
    pool: SqlitePool,
}

impl SqliteJobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_job(row: &sqlx::sqlite::SqliteRow) -> CacheResult<JobRecord> {
        Ok(JobRecord {
            global_id: row.try_get("global_id")?,
            status: row.try_get("status")?,
            source_status: row.try_get("source_status")?,
            details: JobDetails {
                owner: row.try_get("owner")?,
                job_name: row.try_get("job_name")?,
                cluster_name: row.try_get("cluster_name")?,
                queue_name: row.try_get("queue_name")?,
                exit_code: row.try_get("exit_code")?,
                cpu_count: row.try_get("cpu_count")?,
                submission_time: row.try_get("submission_time")?,
                completion_time: row.try_get("completion_time")?,
                session_erase_time: row.try_get("session_erase_time")?,
                proxy_expiration_time: row.try_get("proxy_expiration_time")?,
                used_cpu_time: row.try_get("used_cpu_time")?,
                used_wall_time: row.try_get("used_wall_time")?,
                req_cpu_time: row.try_get("req_cpu_time")?,
                req_wall_time: row.try_get("req_wall_time")?,
                submission_ui: row.try_get("submission_ui")?,
            },
            rerun_count: row.try_get("rerun_count")?,
            last_modified: row.try_get("last_modified")?,
        })
    }
}

#[async_trait]
impl JobRepository for SqliteJobRepository {
    async fn get(&self, global_id: &str) -> CacheResult<Option<JobRecord>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE global_id = ?");
        let row = sqlx::query(&sql)
            .bind(global_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(CacheError::Database)?;

        row.as_ref().map(Self::row_to_job).transpose()
    }

    async fn list_unresolved_for_cluster(&self, hostname: &str) -> CacheResult<Vec<JobRecord>> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE cluster_name = ? AND status NOT IN {RESOLVED_STATUS_SQL} ORDER BY global_id"
        );
        let rows = sqlx::query(&sql)
            .bind(hostname)
            .fetch_all(&self.pool)
            .await
            .map_err(CacheError::Database)?;

        rows.iter().map(Self::row_to_job).collect()
    }

    async fn purge_resolved(&self, before: DateTime<Utc>) -> CacheResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM jobs
            WHERE status IN ('FIN_FETCHED', 'FIN_DELETED', 'FLD_FETCHED', 'FLD_DELETED',
                             'KIL_FETCHED', 'KIL_DELETED')
                AND last_modified <= ?
            "#,
        )
        .bind(before)
        .execute(&self.pool)
        .await
        .map_err(CacheError::Database)?;

        debug!("清理已解决作业: {} 条", result.rows_affected());
        Ok(result.rows_affected())
    }

    async fn purge_lost(&self, before: DateTime<Utc>) -> CacheResult<u64> {
        let result = sqlx::query("DELETE FROM jobs WHERE status = ? AND completion_time <= ?")
            .bind(JobStatus::Lost)
            .bind(before)
            .execute(&self.pool)
            .await
            .map_err(CacheError::Database)?;

        debug!("清理丢失作业: {} 条", result.rows_affected());
        Ok(result.rows_affected())
    }

    async fn list_completed_since(
        &self,
        since: DateTime<Utc>,
    ) -> CacheResult<Vec<CompletedJobUsage>> {
        let rows = sqlx::query(
            r#"
            SELECT owner, used_wall_time, used_cpu_time, completion_time FROM jobs
            WHERE completion_time >= ? AND status != 'LOST'
            ORDER BY completion_time
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(CacheError::Database)?;

        rows.iter()
            .map(|row| {
                Ok(CompletedJobUsage {
                    owner: row.try_get("owner")?,
                    used_wall_time: row.try_get("used_wall_time")?,
                    used_cpu_time: row.try_get("used_cpu_time")?,
                    completion_time: row.try_get("completion_time")?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::sqlite::test_support::{cluster, job, pool, queue};
    use crate::database::sqlite::SqliteClusterRepository;
    use chrono::Duration;
    use infocache_core::models::ClusterChangeset;
    use infocache_core::traits::ClusterRepository;

    async fn seed(pool: &SqlitePool, jobs: Vec<JobRecord>, now: DateTime<Utc>) {
        let repo = SqliteClusterRepository::new(pool.clone());
        let mut changeset = ClusterChangeset::new(cluster("c1.example.org", now))
            .with_queue(queue("c1.example.org", "batch", now));
        changeset.job_writes = jobs;
        repo.apply_changeset(&changeset).await.unwrap();
    }

    #[tokio::test]
    async fn test_job_roundtrip_and_unresolved_listing() {
        let pool = pool().await;
        let now = Utc::now();
        let mut running = job("job-1", "c1.example.org", "batch", JobStatus::Running, now);
        running.details.exit_code = Some(0);
        running.details.session_erase_time = Some(now + Duration::hours(1));
        running.rerun_count = 2;

        seed(
            &pool,
            vec![
                running.clone(),
                job("job-2", "c1.example.org", "batch", JobStatus::FldDeleted, now),
                job("job-3", "c1.example.org", "batch", JobStatus::Finished, now),
            ],
            now,
        )
        .await;

        let repo = SqliteJobRepository::new(pool);
        assert_eq!(repo.get("job-1").await.unwrap(), Some(running));

        let unresolved = repo.list_unresolved_for_cluster("c1.example.org").await.unwrap();
        assert_eq!(
            unresolved.iter().map(|j| j.global_id.as_str()).collect::<Vec<_>>(),
            vec!["job-1", "job-3"]
        );
        assert!(repo.list_unresolved_for_cluster("other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retention_boundary_is_inclusive() {
        let pool = pool().await;
        let now = Utc::now();
        let cutoff = now - Duration::hours(24);

        let at_cutoff = job("at-cutoff", "c1.example.org", "batch", JobStatus::FinFetched, cutoff);
        let after_cutoff = job(
            "after-cutoff",
            "c1.example.org",
            "batch",
            JobStatus::KilDeleted,
            cutoff + Duration::seconds(1),
        );
        let unresolved = job("finished", "c1.example.org", "batch", JobStatus::Finished, cutoff);
        let mut lost = job("lost", "c1.example.org", "batch", JobStatus::Lost, now);
        lost.details.completion_time = Some(cutoff);
        let mut recent_lost = job("recent-lost", "c1.example.org", "batch", JobStatus::Lost, now);
        recent_lost.details.completion_time = Some(now);

        seed(&pool, vec![at_cutoff, after_cutoff, unresolved, lost, recent_lost], now).await;

        let repo = SqliteJobRepository::new(pool);
        assert_eq!(repo.purge_resolved(cutoff).await.unwrap(), 1);
        assert_eq!(repo.purge_lost(cutoff).await.unwrap(), 1);

        assert!(repo.get("at-cutoff").await.unwrap().is_none());
        assert!(repo.get("after-cutoff").await.unwrap().is_some());
        assert!(repo.get("finished").await.unwrap().is_some());
        assert!(repo.get("lost").await.unwrap().is_none());
        assert!(repo.get("recent-lost").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_completed_since() {
        let pool = pool().await;
        let now = Utc::now();

        let mut recent = job("recent", "c1.example.org", "batch", JobStatus::Finished, now);
        recent.details.completion_time = Some(now - Duration::hours(1));
        recent.details.used_wall_time = Some(600);
        let mut old = job("old", "c1.example.org", "batch", JobStatus::FinDeleted, now);
        old.details.completion_time = Some(now - Duration::hours(48));
        let mut lost = job("lost", "c1.example.org", "batch", JobStatus::Lost, now);
        lost.details.completion_time = Some(now);

        seed(&pool, vec![recent, old, lost], now).await;

        let repo = SqliteJobRepository::new(pool);
        let usage = repo.list_completed_since(now - Duration::hours(24)).await.unwrap();
        assert_eq!(usage.len(), 1);
        assert_eq!(usage[0].used_wall_time, Some(600));
        assert_eq!(usage[0].owner.as_deref(), Some("/O=Grid/CN=Alice"));
    }
}
