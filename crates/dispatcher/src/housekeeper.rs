use std::time::Instant;

use chrono::{DateTime, Utc};
use infocache_core::config::HousekeeperConfig;
use infocache_core::CacheResult;
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, error, info};

use crate::context::CacheContext;

/// 清理统计
#[derive(Debug, Clone, Default)]
pub struct CleanupStats {
    pub clusters_removed: u64,
    pub resolved_jobs_removed: u64,
    pub lost_jobs_removed: u64,
    pub registries_removed: u64,
    pub total_removed: u64,
    pub duration: std::time::Duration,
}

impl CleanupStats {
    pub fn has_cleanup(&self) -> bool {
        self.total_removed > 0
    }
}

/// 过期数据清理
///
/// 边界是包含的：最后修改时间恰好等于 `now - 保留时长` 的记录会被删除。
pub struct Housekeeper {
    context: CacheContext,
    config: HousekeeperConfig,
}

impl Housekeeper {
    pub fn new(context: CacheContext) -> Self {
        let config = context.config.housekeeper.clone();
        Self { context, config }
    }

    /// 以 `now` 为基准执行一次清理
    pub async fn run_once(&self, now: DateTime<Utc>) -> CacheResult<CleanupStats> {
        let start_time = Instant::now();
        let mut stats = CleanupStats::default();

        let timeouts = &self.context.timeouts;

        // 不活跃的集群，队列和授权条目级联删除
        let cluster_cutoff = now - self.config.inactive_cluster_retention();
        debug!("清理 {} 之前下线的集群", cluster_cutoff);
        stats.clusters_removed = timeouts
            .store_operation(self.context.clusters.purge_inactive(cluster_cutoff), "purge_clusters")
            .await?;

        let job_cutoff = now - self.config.resolved_job_retention();
        stats.resolved_jobs_removed = timeouts
            .store_operation(self.context.jobs.purge_resolved(job_cutoff), "purge_resolved_jobs")
            .await?;
        stats.lost_jobs_removed = timeouts
            .store_operation(self.context.jobs.purge_lost(job_cutoff), "purge_lost_jobs")
            .await?;

        stats.registries_removed = timeouts
            .store_operation(
                self.context.registries.purge_inactive(cluster_cutoff),
                "purge_registries",
            )
            .await?;

        stats.total_removed = stats.clusters_removed
            + stats.resolved_jobs_removed
            + stats.lost_jobs_removed
            + stats.registries_removed;
        stats.duration = start_time.elapsed();

        if stats.has_cleanup() {
            info!(
                "清理完成: 共删除 {} 条记录，耗时 {:?} (集群: {}, 已解决作业: {}, 丢失作业: {}, 注册中心: {})",
                stats.total_removed,
                stats.duration,
                stats.clusters_removed,
                stats.resolved_jobs_removed,
                stats.lost_jobs_removed,
                stats.registries_removed
            );
        }
        self.context
            .metrics
            .record_housekeeping(stats.total_removed, stats.duration);

        Ok(stats)
    }

    /// 按配置的间隔运行，直到收到关闭信号
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        if !self.config.enabled {
            info!("过期数据清理已禁用");
            return;
        }

        let mut cleanup_interval = interval(std::time::Duration::from_secs(self.config.period_seconds));
        info!("过期数据清理已启动，间隔 {} 秒", self.config.period_seconds);

        loop {
            tokio::select! {
                _ = cleanup_interval.tick() => {
                    if let Err(e) = self.run_once(Utc::now()).await {
                        error!("过期数据清理失败: {}", e);
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("收到关闭信号，停止过期数据清理");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{cluster_record, job_snapshot, queue_record, test_context};
    use chrono::Duration;
    use infocache_core::models::{ClusterChangeset, JobRecord, JobStatus};

    #[tokio::test]
    async fn test_retention_boundary_is_inclusive() {
        let (context, _) = test_context().await;
        let now = Utc::now();
        let retention = context.config.housekeeper.resolved_job_retention();

        let at_boundary = now - retention;
        let inside = at_boundary + Duration::seconds(1);
        let mut changeset = ClusterChangeset::new(cluster_record("c1.example.org", now))
            .with_queue(queue_record("c1.example.org", "batch", now));
        for (id, status, at) in [
            ("boundary", JobStatus::FinFetched, at_boundary),
            ("fresh", JobStatus::FldDeleted, inside),
            ("running", JobStatus::Running, at_boundary),
        ] {
            let snapshot = job_snapshot("c1.example.org", "batch", id, status.as_str());
            changeset
                .job_writes
                .push(JobRecord::from_snapshot(&snapshot, status, at));
        }
        context.clusters.apply_changeset(&changeset).await.unwrap();

        let stats = Housekeeper::new(context.clone()).run_once(now).await.unwrap();
        assert_eq!(stats.resolved_jobs_removed, 1);
        assert!(context.jobs.get("boundary").await.unwrap().is_none());
        assert!(context.jobs.get("fresh").await.unwrap().is_some());
        assert!(context.jobs.get("running").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_inactive_clusters_purged_after_retention() {
        let (context, _) = test_context().await;
        let now = Utc::now();
        let retention = context.config.housekeeper.inactive_cluster_retention();
        let old = now - retention - Duration::minutes(1);

        for host in ["old.example.org", "recent.example.org"] {
            context
                .clusters
                .apply_changeset(&ClusterChangeset::new(cluster_record(host, old)))
                .await
                .unwrap();
        }
        context.clusters.deactivate("old.example.org", false, old).await.unwrap();
        context.clusters.deactivate("recent.example.org", false, now).await.unwrap();

        let stats = Housekeeper::new(context.clone()).run_once(now).await.unwrap();
        assert_eq!(stats.clusters_removed, 1);
        assert!(stats.has_cleanup());
        assert!(context.clusters.get("old.example.org").await.unwrap().is_none());
        assert!(context.clusters.get("recent.example.org").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_nothing_to_clean() {
        let (context, _) = test_context().await;
        let stats = Housekeeper::new(context).run_once(Utc::now()).await.unwrap();
        assert!(!stats.has_cleanup());
    }
}
