//! 统计汇总
//!
//! 每个轮询周期结束后，从活跃的集群和队列重新计算网格 → 集群 → 队列三级汇总，
//! 整体替换上一份结果。按组的作业用量依赖成员目录，成员目录查询失败时
//! 只丢弃用量部分，汇总本身照常写入。

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use infocache_core::models::{GroupUsage, StatsRecord};
use infocache_core::CacheResult;
use tracing::{debug, info, warn};

use crate::context::CacheContext;

pub struct StatisticsAggregator {
    context: CacheContext,
}

impl StatisticsAggregator {
    pub fn new(context: CacheContext) -> Self {
        Self { context }
    }

    /// 计算并写入汇总
    pub async fn refresh(&self, now: DateTime<Utc>) -> CacheResult<StatsRecord> {
        let config = &self.context.config.stats;
        let clusters = self.context.clusters.list_active().await?;
        let queues = self.context.queues.list_active().await?;

        let mut stats = StatsRecord::rollup(&config.grid_name, &clusters, &queues, now);
        stats.usage = match self.group_usage(now).await {
            Ok(usage) => usage,
            Err(e) => {
                warn!("按组用量统计失败，本次汇总不含用量: {}", e);
                None
            }
        };

        self.context.stats.replace(&stats).await?;
        info!(
            clusters = stats.children.len(),
            total_cpus = stats.counter("total_cpus"),
            running = stats.counter("running"),
            "统计汇总已更新"
        );
        Ok(stats)
    }

    /// 统计窗口内各组已完成作业的用量；没有配置任何组时返回 `None`
    async fn group_usage(
        &self,
        now: DateTime<Utc>,
    ) -> CacheResult<Option<BTreeMap<String, GroupUsage>>> {
        let groups = self.context.principals.list_groups().await?;
        if groups.is_empty() {
            return Ok(None);
        }

        let mut membership: HashMap<String, Vec<String>> = HashMap::new();
        for group in &groups {
            for principal in self.context.principals.list_principals(group).await? {
                membership.entry(principal).or_default().push(group.clone());
            }
        }

        let since = now - self.context.config.stats.usage_window();
        let completed = self.context.jobs.list_completed_since(since).await?;
        debug!("统计窗口内已完成作业 {} 个", completed.len());

        let mut usage: BTreeMap<String, GroupUsage> = groups
            .iter()
            .map(|group| (group.clone(), GroupUsage::default()))
            .collect();
        for job in &completed {
            let Some(owner) = job.owner.as_deref() else {
                continue;
            };
            for group in membership.get(owner).into_iter().flatten() {
                if let Some(entry) = usage.get_mut(group) {
                    entry.jobs += 1;
                    entry.wall_time += job.used_wall_time.unwrap_or(0);
                    entry.cpu_time += job.used_cpu_time.unwrap_or(0);
                }
            }
        }

        Ok(Some(usage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{cluster_record, job_snapshot, queue_record, test_context};
    use async_trait::async_trait;
    use chrono::Duration;
    use infocache_core::models::{ClusterChangeset, JobRecord, JobStatus};
    use infocache_core::traits::PrincipalDirectory;
    use infocache_core::CacheError;
    use std::sync::Arc;

    struct FailingPrincipals;

    #[async_trait]
    impl PrincipalDirectory for FailingPrincipals {
        async fn list_groups(&self) -> CacheResult<Vec<String>> {
            Err(CacheError::Internal("membership service down".to_string()))
        }

        async fn list_principals(&self, _group: &str) -> CacheResult<Vec<String>> {
            Ok(vec![])
        }
    }

    async fn seed(context: &CacheContext, now: DateTime<Utc>) {
        let mut changeset = ClusterChangeset::new(cluster_record("c1.example.org", now))
            .with_queue(queue_record("c1.example.org", "batch", now));
        let snapshot = job_snapshot("c1.example.org", "batch", "job-1", "FINISHED");
        let mut job = JobRecord::from_snapshot(&snapshot, JobStatus::Finished, now);
        job.details.completion_time = Some(now - Duration::hours(1));
        job.details.used_wall_time = Some(600);
        job.details.used_cpu_time = Some(500);
        changeset.job_writes.push(job);
        context.clusters.apply_changeset(&changeset).await.unwrap();
    }

    #[tokio::test]
    async fn test_refresh_rolls_up_and_counts_group_usage() {
        let (context, _) = test_context().await;
        let now = Utc::now();
        seed(&context, now).await;

        let stats = StatisticsAggregator::new(context.clone())
            .refresh(now)
            .await
            .unwrap();

        assert_eq!(stats.counter("total_cpus"), 64);
        assert_eq!(stats.counter("running"), 2);
        let usage = stats.usage.as_ref().unwrap();
        assert_eq!(usage["atlas"].jobs, 1);
        assert_eq!(usage["atlas"].wall_time, 600);

        let stored = context.stats.latest("NorduGrid").await.unwrap().unwrap();
        assert_eq!(stored, stats);
    }

    #[tokio::test]
    async fn test_membership_failure_drops_only_usage() {
        let (mut context, _) = test_context().await;
        context.principals = Arc::new(FailingPrincipals);
        let now = Utc::now();
        seed(&context, now).await;

        let stats = StatisticsAggregator::new(context.clone())
            .refresh(now)
            .await
            .unwrap();

        assert!(stats.usage.is_none());
        assert_eq!(stats.children.len(), 1);
        assert!(context.stats.latest("NorduGrid").await.unwrap().is_some());
    }
}
