//! 状态对账
//!
//! 把一个计算资源本周期的观测和库中已知状态合并成一个变更集，在一个事务中提交。
//! 作业的判定只发生在"作业已被轮询"的队列上：
//! 作业分组不可用的队列本周期不做任何缺失判定，
//! 从快照中整体消失的队列视为其作业全部缺失。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use infocache_core::models::{
    decide, ClusterChangeset, ClusterRecord, EndpointId, JobDecision, JobRecord, JobSnapshot,
    JobStatus, LifecycleClock, QueueRecord,
};
use infocache_core::traits::{ClusterRepository, JobRepository};
use infocache_core::CacheResult;
use tracing::{debug, error, info, warn};

use crate::health::HealthPolicy;

/// 一个队列的观测
#[derive(Debug, Clone)]
pub struct QueueSnapshot {
    pub queue: QueueRecord,
    /// `None` 表示作业分组不可用
    pub jobs: Option<Vec<JobSnapshot>>,
}

/// 一个计算资源在本周期的完整观测
#[derive(Debug, Clone)]
pub struct ClusterSnapshot {
    pub endpoint: EndpointId,
    pub cluster: ClusterRecord,
    pub queues: Vec<QueueSnapshot>,
    /// 存在但记录无法解析的队列，保持原状
    pub unparsed_queues: Vec<String>,
}

impl ClusterSnapshot {
    pub fn hostname(&self) -> &str {
        &self.cluster.hostname
    }
}

/// 作业判定结果
#[derive(Debug, Clone, Default)]
pub struct JobPlan {
    pub writes: Vec<JobRecord>,
    pub inserted: u64,
    pub updated: u64,
    pub lost: u64,
    pub reruns: u64,
    pub ignored: u64,
}

/// 一个集群的对账结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub hostname: String,
    pub endpoint: Option<EndpointId>,
    /// 集群此前不存在或不活跃
    pub reactivated: bool,
    pub queues_written: u64,
    pub queues_deactivated: u64,
    pub jobs_inserted: u64,
    pub jobs_updated: u64,
    pub jobs_lost: u64,
    pub jobs_rerun: u64,
    pub jobs_refused: u64,
}

impl ReconcileOutcome {
    pub fn jobs_written(&self) -> u64 {
        (self.jobs_inserted + self.jobs_updated + self.jobs_lost + self.jobs_rerun)
            .saturating_sub(self.jobs_refused)
    }
}

/// 对一个集群的作业做判定，不访问存储
pub fn plan_jobs(
    snapshot: &ClusterSnapshot,
    known: &[JobRecord],
    clock: &LifecycleClock,
) -> JobPlan {
    let mut plan = JobPlan::default();
    let hostname = snapshot.hostname();

    let listed: HashSet<&str> = snapshot
        .queues
        .iter()
        .map(|q| q.queue.name.as_str())
        .chain(snapshot.unparsed_queues.iter().map(String::as_str))
        .collect();
    let job_polled: HashSet<&str> = snapshot
        .queues
        .iter()
        .filter(|q| q.jobs.is_some())
        .map(|q| q.queue.name.as_str())
        .collect();

    let mut observed: HashMap<&str, &JobSnapshot> = HashMap::new();
    for job in snapshot.queues.iter().filter_map(|q| q.jobs.as_ref()).flatten() {
        observed.insert(job.global_id.as_str(), job);
    }
    let known_by_id: HashMap<&str, &JobRecord> =
        known.iter().map(|job| (job.global_id.as_str(), job)).collect();

    let mut decisions = Vec::with_capacity(observed.len());
    for (id, job) in &observed {
        decisions.push(decide(known_by_id.get(id).copied(), Some(*job), clock));
    }
    for job in known {
        if observed.contains_key(job.global_id.as_str()) {
            continue;
        }
        let queue = job.details.queue_name.as_str();
        if job_polled.contains(queue) || !listed.contains(queue) {
            decisions.push(decide(Some(job), None, clock));
        }
    }

    for decision in decisions {
        match decision {
            JobDecision::Insert(record) => {
                plan.inserted += 1;
                plan.writes.push(record);
            }
            JobDecision::Update { record, previous } => {
                if record.status == JobStatus::Lost && previous != JobStatus::Lost {
                    info!(
                        "作业 {} 在集群 {} 上丢失 (原状态: {})",
                        record.global_id,
                        hostname,
                        previous.as_str()
                    );
                    plan.lost += 1;
                } else if previous.is_rerun(record.status) {
                    warn!(
                        "作业 {} 在集群 {} 上被重新运行: {} -> {} (第 {} 次)",
                        record.global_id,
                        hostname,
                        previous.as_str(),
                        record.status.as_str(),
                        record.rerun_count
                    );
                    plan.reruns += 1;
                } else {
                    plan.updated += 1;
                }
                plan.writes.push(record);
            }
            JobDecision::Ignore => plan.ignored += 1,
            JobDecision::Unchanged => {}
        }
    }

    plan
}

/// 状态对账器
pub struct StateReconciler {
    clusters: Arc<dyn ClusterRepository>,
    jobs: Arc<dyn JobRepository>,
}

impl StateReconciler {
    pub fn new(clusters: Arc<dyn ClusterRepository>, jobs: Arc<dyn JobRepository>) -> Self {
        Self { clusters, jobs }
    }

    /// 提交一个集群的观测
    pub async fn reconcile(
        &self,
        snapshot: ClusterSnapshot,
        clock: &LifecycleClock,
    ) -> CacheResult<ReconcileOutcome> {
        let hostname = snapshot.hostname().to_string();
        let known = self.jobs.list_unresolved_for_cluster(&hostname).await?;
        let plan = plan_jobs(&snapshot, &known, clock);

        let ClusterSnapshot {
            endpoint,
            cluster,
            queues,
            unparsed_queues,
        } = snapshot;

        let mut changeset = ClusterChangeset::new(cluster);
        for queue in queues {
            changeset = changeset.with_queue(queue.queue);
        }
        changeset.present_queues.extend(unparsed_queues);
        changeset.job_writes = plan.writes;

        let summary = self.clusters.apply_changeset(&changeset).await?;
        if summary.reactivated {
            info!("集群 {} 变为活跃", hostname);
        }
        if summary.jobs_refused > 0 {
            debug!(
                "集群 {} 有 {} 个作业写入因记录已解决被拒绝",
                hostname, summary.jobs_refused
            );
        }

        Ok(ReconcileOutcome {
            hostname,
            endpoint: Some(endpoint),
            reactivated: summary.reactivated,
            queues_written: summary.queues_written,
            queues_deactivated: summary.queues_deactivated,
            jobs_inserted: plan.inserted,
            jobs_updated: plan.updated,
            jobs_lost: plan.lost,
            jobs_rerun: plan.reruns,
            jobs_refused: summary.jobs_refused,
        })
    }

    /// 周期结束时下线本周期没有成功轮询的活跃集群
    pub async fn deactivate_missing(
        &self,
        cycle_start: DateTime<Utc>,
        polled: &HashSet<String>,
        health: &HealthPolicy,
    ) -> CacheResult<Vec<String>> {
        let stale = self.clusters.list_stale_active(cycle_start).await?;
        let mut deactivated = Vec::new();

        for cluster in stale {
            if polled.contains(&cluster.hostname) {
                continue;
            }

            let blacklisted = health.peek_blacklisted(&cluster.endpoint_host).await;
            match self
                .clusters
                .deactivate(&cluster.hostname, blacklisted, Utc::now())
                .await
            {
                Ok(summary) => {
                    info!(
                        hostname = %cluster.hostname,
                        blacklisted = blacklisted,
                        queues = summary.queues_deactivated,
                        access_entries = summary.access_entries_removed,
                        "集群下线"
                    );
                    deactivated.push(cluster.hostname);
                }
                Err(e) => {
                    error!("下线集群 {} 失败: {}", cluster.hostname, e);
                }
            }
        }

        Ok(deactivated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{cluster_record, job_snapshot, queue_record, test_context};
    use chrono::Duration;

    fn snapshot(queues: Vec<QueueSnapshot>) -> ClusterSnapshot {
        snapshot_of("c1.example.org", Utc::now(), queues)
    }

    fn snapshot_of(
        host: &str,
        observed_at: DateTime<Utc>,
        queues: Vec<QueueSnapshot>,
    ) -> ClusterSnapshot {
        ClusterSnapshot {
            endpoint: EndpointId::new(host, 2135),
            cluster: cluster_record(host, observed_at),
            queues,
            unparsed_queues: Vec::new(),
        }
    }

    fn polled(name: &str, jobs: Vec<JobSnapshot>) -> QueueSnapshot {
        QueueSnapshot {
            queue: queue_record("c1.example.org", name, Utc::now()),
            jobs: Some(jobs),
        }
    }

    fn clock() -> LifecycleClock {
        let now = Utc::now();
        LifecycleClock {
            now,
            cycle_start: now,
            fetched_check: false,
        }
    }

    fn known(id: &str, queue: &str, status: JobStatus) -> JobRecord {
        let snapshot = job_snapshot("c1.example.org", queue, id, status.as_str());
        JobRecord::from_snapshot(&snapshot, status, Utc::now() - Duration::minutes(5))
    }

    #[test]
    fn test_absent_job_in_polled_queue_is_lost() {
        let snap = snapshot(vec![polled("batch", vec![])]);
        let plan = plan_jobs(&snap, &[known("job-1", "batch", JobStatus::Running)], &clock());

        assert_eq!(plan.lost, 1);
        assert_eq!(plan.writes[0].status, JobStatus::Lost);
        assert!(plan.writes[0].details.completion_time.is_some());
    }

    #[test]
    fn test_unavailable_job_group_is_not_judged() {
        let mut snap = snapshot(vec![QueueSnapshot {
            queue: queue_record("c1.example.org", "batch", Utc::now()),
            jobs: None,
        }]);
        snap.unparsed_queues.push("broken".to_string());
        let known = vec![
            known("job-1", "batch", JobStatus::Running),
            known("job-2", "broken", JobStatus::Submitted),
        ];

        let plan = plan_jobs(&snap, &known, &clock());
        assert!(plan.writes.is_empty());
    }

    #[test]
    fn test_jobs_of_vanished_queue_are_lost() {
        let snap = snapshot(vec![polled("batch", vec![])]);
        let plan = plan_jobs(&snap, &[known("job-1", "retired", JobStatus::Submitted)], &clock());
        assert_eq!(plan.lost, 1);
    }

    #[test]
    fn test_insert_update_rerun_and_ignore() {
        let snap = snapshot(vec![polled(
            "batch",
            vec![
                job_snapshot("c1.example.org", "batch", "new-job", "INLRMS:Q"),
                job_snapshot("c1.example.org", "batch", "running-job", "FINISHED"),
                job_snapshot("c1.example.org", "batch", "rerun-job", "INLRMS:R"),
                job_snapshot("c1.example.org", "batch", "gone-job", "DELETED"),
            ],
        )]);
        let known = vec![
            known("running-job", "batch", JobStatus::Running),
            known("rerun-job", "batch", JobStatus::Failed),
        ];

        let plan = plan_jobs(&snap, &known, &clock());
        assert_eq!(plan.inserted, 1);
        assert_eq!(plan.updated, 1);
        assert_eq!(plan.reruns, 1);
        assert_eq!(plan.ignored, 1);
        let rerun = plan.writes.iter().find(|j| j.global_id == "rerun-job").unwrap();
        assert_eq!(rerun.rerun_count, 1);
        assert_eq!(rerun.status, JobStatus::Running);
    }

    #[tokio::test]
    async fn test_reconcile_writes_and_reports() {
        let (context, _) = test_context().await;
        let reconciler = StateReconciler::new(context.clusters.clone(), context.jobs.clone());

        let first = reconciler
            .reconcile(
                snapshot(vec![polled(
                    "batch",
                    vec![job_snapshot("c1.example.org", "batch", "job-1", "INLRMS:R")],
                )]),
                &clock(),
            )
            .await
            .unwrap();
        assert!(first.reactivated);
        assert_eq!(first.jobs_inserted, 1);

        let second = reconciler
            .reconcile(snapshot(vec![polled("batch", vec![])]), &clock())
            .await
            .unwrap();
        assert!(!second.reactivated);
        assert_eq!(second.jobs_lost, 1);

        let job = context.jobs.get("job-1").await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Lost);
    }

    #[tokio::test]
    async fn test_deactivate_missing_skips_polled_and_fresh() {
        let (context, _) = test_context().await;
        let reconciler = StateReconciler::new(context.clusters.clone(), context.jobs.clone());
        for host in ["c1.example.org", "c2.example.org", "c3.example.org"] {
            let earlier = Utc::now() - Duration::minutes(10);
            let queue = QueueSnapshot {
                queue: queue_record(host, "batch", earlier),
                jobs: Some(vec![]),
            };
            reconciler
                .reconcile(snapshot_of(host, earlier, vec![queue]), &clock())
                .await
                .unwrap();
        }
        context.health.begin_cycle().await;
        context.health.blacklist("c2.example.org").await;

        let polled_hosts: HashSet<String> = ["c1.example.org".to_string()].into_iter().collect();
        let deactivated = reconciler
            .deactivate_missing(Utc::now(), &polled_hosts, &context.health)
            .await
            .unwrap();

        assert_eq!(deactivated.len(), 2);
        let c2 = context.clusters.get("c2.example.org").await.unwrap().unwrap();
        assert!(!c2.is_active());
        assert!(c2.blacklisted);
        let c3 = context.clusters.get("c3.example.org").await.unwrap().unwrap();
        assert!(!c3.blacklisted);
        assert!(context.clusters.get("c1.example.org").await.unwrap().unwrap().is_active());
    }
}
