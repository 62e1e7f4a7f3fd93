//! 轮询分发
//!
//! 固定数量的工作者从共享工作队列中领取计算资源，逐个抓取并对账。
//! 同一主机同一时刻只有一个工作者在处理；单个端点受端点超时限制，
//! 整个周期受截止时间限制，到期后未完成的端点被放弃，已提交的结果保留。

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use infocache_core::models::schema::{
    CLUSTER_OBJECT_CLASS, JOB_OBJECT_CLASS, QUEUE_OBJECT_CLASS,
};
use infocache_core::models::{
    ClusterRecord, DirectoryRecord, Endpoint, EndpointId, JobSnapshot, LifecycleClock,
    QueueField, QueueRecord, RecordField, SearchFilter,
};
use infocache_core::traits::{DirectoryFailure, DirectoryQuery};
use infocache_core::{CacheError, CacheResult};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::context::CacheContext;
use crate::reconciler::{ClusterSnapshot, QueueSnapshot, ReconcileOutcome, StateReconciler};

/// 单个端点的处理结果
#[derive(Debug, Clone)]
pub enum PollOutcome {
    Polled(ReconcileOutcome),
    /// 目录查询失败或记录无法解析，端点已被拉黑
    Failed(String),
    /// 存储写入失败，下个周期重试
    StoreFailed(String),
    Blacklisted,
    /// 同一主机已有在途轮询
    Skipped,
}

/// 一个轮询周期的报告
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub cycle: u64,
    pub fetched_check: bool,
    pub reachable_registries: usize,
    /// 没有可达注册中心时，使用库中活跃集群作为工作清单
    pub used_fallback: bool,
    pub polled: Vec<ReconcileOutcome>,
    pub failed: Vec<EndpointId>,
    pub blacklisted: Vec<EndpointId>,
    pub skipped: Vec<EndpointId>,
    pub abandoned: Vec<EndpointId>,
    pub deactivated: Vec<String>,
    pub duration: Duration,
}

impl CycleReport {
    pub fn polled_hosts(&self) -> HashSet<String> {
        self.polled.iter().map(|o| o.hostname.clone()).collect()
    }

    /// 本周期新激活或重新激活的集群
    pub fn newly_active(&self) -> Vec<&str> {
        self.polled
            .iter()
            .filter(|o| o.reactivated)
            .map(|o| o.hostname.as_str())
            .collect()
    }

    pub fn jobs_written(&self) -> u64 {
        self.polled.iter().map(ReconcileOutcome::jobs_written).sum()
    }

    pub fn jobs_lost(&self) -> u64 {
        self.polled.iter().map(|o| o.jobs_lost).sum()
    }

    pub fn jobs_rerun(&self) -> u64 {
        self.polled.iter().map(|o| o.jobs_rerun).sum()
    }

    pub fn jobs_refused(&self) -> u64 {
        self.polled.iter().map(|o| o.jobs_refused).sum()
    }
}

/// 从一个计算资源抓取完整快照
pub async fn fetch_snapshot(
    context: &CacheContext,
    endpoint: &Endpoint,
) -> CacheResult<ClusterSnapshot> {
    let directory = context.directory.as_ref();
    let timeout = context.config.directory.query_timeout();
    let started = Instant::now();

    let clusters = directory
        .query(
            &endpoint.id,
            &DirectoryQuery::subtree(
                endpoint.base.clone(),
                SearchFilter::object_class(CLUSTER_OBJECT_CLASS),
            ),
            timeout,
        )
        .await?;
    let response_time = started.elapsed().as_secs_f64();
    let cluster_entry = match clusters.as_slice() {
        [] => {
            return Err(CacheError::Schema(format!(
                "端点 {} 的 {} 下没有集群对象",
                endpoint.id, endpoint.base
            )))
        }
        [only] => only,
        [first, ..] => {
            warn!(
                "端点 {} 报告了 {} 个集群对象，只使用第一个",
                endpoint.id,
                clusters.len()
            );
            first
        }
    };

    let queue_entries = directory
        .query(
            &endpoint.id,
            &DirectoryQuery::one_level(
                cluster_entry.dn.clone(),
                SearchFilter::object_class(QUEUE_OBJECT_CLASS),
            ),
            timeout,
        )
        .await?;

    let now = Utc::now();
    let mut cluster = ClusterRecord::from_directory(cluster_entry, &endpoint.id, now)?;
    let mut queues = Vec::with_capacity(queue_entries.len());
    let mut unparsed_queues = Vec::new();

    for entry in &queue_entries {
        let queue = match QueueRecord::from_directory(entry, &cluster.hostname, now) {
            Ok(queue) => queue,
            Err(e) => {
                warn!("集群 {} 的队列记录无法解析，本周期跳过: {}", cluster.hostname, e);
                if let Some(name) = entry.first(QueueField::Name.attribute()) {
                    unparsed_queues.push(name.trim().to_string());
                }
                continue;
            }
        };

        let jobs = fetch_jobs(context, endpoint, entry, &cluster.hostname, &queue.name).await?;
        queues.push(QueueSnapshot { queue, jobs });
    }

    let elapsed = started.elapsed().as_secs_f64();
    cluster.response_time = Some(response_time);
    cluster.processing_time = Some(elapsed);

    debug!(
        "抓取集群 {} 完成: {} 个队列, 耗时 {:.3}s",
        cluster.hostname,
        queues.len(),
        elapsed
    );

    Ok(ClusterSnapshot {
        endpoint: endpoint.id.clone(),
        cluster,
        queues,
        unparsed_queues,
    })
}

/// 抓取一个队列的作业；作业分组不存在或有无法解析的作业时返回 `None`
async fn fetch_jobs(
    context: &CacheContext,
    endpoint: &Endpoint,
    queue_entry: &DirectoryRecord,
    hostname: &str,
    queue: &str,
) -> CacheResult<Option<Vec<JobSnapshot>>> {
    let base = format!("nordugrid-info-group-name=jobs,{}", queue_entry.dn);
    let entries = match context
        .directory
        .query(
            &endpoint.id,
            &DirectoryQuery::one_level(base, SearchFilter::object_class(JOB_OBJECT_CLASS)),
            context.config.directory.query_timeout(),
        )
        .await
    {
        Ok(entries) => entries,
        Err(DirectoryFailure::NoSuchObject) => {
            debug!("集群 {} 队列 {} 没有作业分组", hostname, queue);
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };

    let mut jobs = Vec::with_capacity(entries.len());
    for entry in &entries {
        match JobSnapshot::from_directory(entry, hostname, queue) {
            Ok(job) => jobs.push(job),
            Err(e) => {
                warn!(
                    "集群 {} 队列 {} 的作业记录无法解析，本周期不判定该队列的作业: {}",
                    hostname, queue, e
                );
                return Ok(None);
            }
        }
    }
    Ok(Some(jobs))
}

#[derive(Clone)]
struct PollWorker {
    context: CacheContext,
    reconciler: Arc<StateReconciler>,
    clock: LifecycleClock,
}

impl PollWorker {
    async fn run(
        self,
        queue: Arc<Mutex<VecDeque<Endpoint>>>,
        results: mpsc::UnboundedSender<(EndpointId, PollOutcome)>,
    ) {
        loop {
            let next = queue.lock().await.pop_front();
            let Some(endpoint) = next else {
                break;
            };
            let outcome = self.poll(&endpoint).await;
            if results.send((endpoint.id, outcome)).is_err() {
                break;
            }
        }
    }

    async fn poll(&self, endpoint: &Endpoint) -> PollOutcome {
        let health = &self.context.health;
        let host = endpoint.host();

        if health.is_blacklisted(host).await {
            debug!("跳过被拉黑的端点 {}", endpoint.id);
            return PollOutcome::Blacklisted;
        }
        if !health.try_claim(host).await {
            debug!("主机 {} 已有在途轮询，跳过端点 {}", host, endpoint.id);
            return PollOutcome::Skipped;
        }

        let result = self.poll_claimed(endpoint).await;
        health.release(host).await;

        match result {
            Ok(outcome) => PollOutcome::Polled(outcome),
            Err(e) if e.is_endpoint_failure() => {
                warn!("端点 {} 轮询失败: {}", endpoint.id, e);
                health.blacklist(host).await;
                PollOutcome::Failed(e.to_string())
            }
            Err(e) => {
                error!("端点 {} 的观测写入失败: {}", endpoint.id, e);
                PollOutcome::StoreFailed(e.to_string())
            }
        }
    }

    /// 抓取受端点超时限制，对账写入受存储超时限制；存储超时不算端点失败
    async fn poll_claimed(&self, endpoint: &Endpoint) -> CacheResult<ReconcileOutcome> {
        let timeouts = &self.context.timeouts;
        let started = Instant::now();
        let snapshot = timeouts
            .endpoint_operation(
                fetch_snapshot(&self.context, endpoint),
                &endpoint.id.to_string(),
            )
            .await?;
        let elapsed = started.elapsed().as_secs_f64();
        self.context
            .health
            .record_response_time(endpoint.host(), elapsed)
            .await;
        self.context.metrics.record_response_time(elapsed);
        timeouts
            .store_operation(self.reconciler.reconcile(snapshot, &self.clock), "reconcile")
            .await
    }
}

/// 轮询分发器
pub struct PollDispatcher {
    context: CacheContext,
    reconciler: Arc<StateReconciler>,
}

impl PollDispatcher {
    pub fn new(context: CacheContext, reconciler: Arc<StateReconciler>) -> Self {
        Self {
            context,
            reconciler,
        }
    }

    /// 轮询工作清单中的全部端点
    pub async fn dispatch(&self, worklist: Vec<Endpoint>, clock: LifecycleClock) -> CycleReport {
        let started = Instant::now();
        let mut report = CycleReport {
            fetched_check: clock.fetched_check,
            ..CycleReport::default()
        };
        if worklist.is_empty() {
            return report;
        }

        let order: Vec<EndpointId> = worklist.iter().map(|e| e.id.clone()).collect();
        let workers = self.context.config.poller.max_workers.min(worklist.len()).max(1);
        let queue = Arc::new(Mutex::new(VecDeque::from(worklist)));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let worker = PollWorker {
            context: self.context.clone(),
            reconciler: self.reconciler.clone(),
            clock,
        };
        let mut join_set = JoinSet::new();
        for _ in 0..workers {
            join_set.spawn(worker.clone().run(queue.clone(), tx.clone()));
        }
        drop(tx);

        let deadline = self.context.config.poller.cycle_deadline();
        if tokio::time::timeout(deadline, join_all(&mut join_set))
            .await
            .is_err()
        {
            warn!("轮询周期达到截止时间 {:?}，放弃未完成的端点", deadline);
            join_set.abort_all();
            join_all(&mut join_set).await;
        }

        let mut outcomes: HashMap<EndpointId, PollOutcome> = HashMap::new();
        while let Ok((id, outcome)) = rx.try_recv() {
            outcomes.insert(id, outcome);
        }

        for id in order {
            match outcomes.remove(&id) {
                Some(PollOutcome::Polled(outcome)) => report.polled.push(outcome),
                Some(PollOutcome::Failed(_)) | Some(PollOutcome::StoreFailed(_)) => {
                    report.failed.push(id)
                }
                Some(PollOutcome::Blacklisted) => report.blacklisted.push(id),
                Some(PollOutcome::Skipped) => report.skipped.push(id),
                None => {
                    self.context.health.release(&id.host).await;
                    report.abandoned.push(id);
                }
            }
        }

        report.duration = started.elapsed();
        info!(
            workers = workers,
            polled = report.polled.len(),
            failed = report.failed.len(),
            blacklisted = report.blacklisted.len(),
            skipped = report.skipped.len(),
            abandoned = report.abandoned.len(),
            "端点轮询完成"
        );
        report
    }
}

async fn join_all(join_set: &mut JoinSet<()>) {
    while let Some(result) = join_set.join_next().await {
        if let Err(e) = result {
            if !e.is_cancelled() {
                error!("轮询工作者异常退出: {}", e);
            }
        }
    }
}
