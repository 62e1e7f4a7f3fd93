//! 轮询周期控制
//!
//! 一个周期依次执行：拓扑发现 → 注册中心元数据刷新 → 分发轮询 →
//! 下线未被轮询到的集群 → 统计汇总。同一时刻只允许一个周期在执行。
//! 没有任何注册中心应答时，以库中的活跃集群作为工作清单，
//! 避免一次注册中心故障让整个缓存失效。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use infocache_core::models::schema::cluster_dn;
use infocache_core::models::{Endpoint, EndpointId, LifecycleClock};
use infocache_core::{CacheError, CacheResult};
use tokio::sync::{broadcast, Mutex};
use tracing::{error, info, warn};

use crate::context::CacheContext;
use crate::poller::{CycleReport, PollDispatcher};
use crate::reconciler::StateReconciler;
use crate::statistics::StatisticsAggregator;
use crate::topology::TopologyResolver;

pub struct CacheController {
    context: CacheContext,
    topology: TopologyResolver,
    dispatcher: PollDispatcher,
    reconciler: Arc<StateReconciler>,
    statistics: StatisticsAggregator,
    cycle_lock: Mutex<()>,
    completed_cycles: AtomicU64,
}

impl CacheController {
    pub fn new(context: CacheContext) -> Self {
        let reconciler = Arc::new(StateReconciler::new(
            context.clusters.clone(),
            context.jobs.clone(),
        ));
        Self {
            topology: TopologyResolver::new(&context),
            dispatcher: PollDispatcher::new(context.clone(), reconciler.clone()),
            statistics: StatisticsAggregator::new(context.clone()),
            reconciler,
            cycle_lock: Mutex::new(()),
            completed_cycles: AtomicU64::new(0),
            context,
        }
    }

    pub fn completed_cycles(&self) -> u64 {
        self.completed_cycles.load(Ordering::SeqCst)
    }

    /// 执行一个完整的轮询周期
    ///
    /// 已有周期在执行时立即返回 [`CacheError::CycleInProgress`]。
    pub async fn run_cycle(&self) -> CacheResult<CycleReport> {
        let _guard = self
            .cycle_lock
            .try_lock()
            .map_err(|_| CacheError::CycleInProgress)?;

        let started = Instant::now();
        let cycle_start = Utc::now();
        let cycle = self.context.health.begin_cycle().await;
        let config = &self.context.config;
        let fetched_check = cycle % config.poller.fetched_check_cycles.max(1) == 0;
        info!(cycle = cycle, fetched_check = fetched_check, "轮询周期开始");

        let roots = config
            .directory
            .root_endpoints()
            .map_err(|e| CacheError::Configuration(e.to_string()))?;
        let topology = self
            .topology
            .resolve(&roots, &config.directory.root_base())
            .await;
        self.context.metrics.record_topology(topology.reachable_registries);

        self.context
            .registries
            .upsert_observations(&topology.registries)
            .await?;
        let unseen = self.context.registries.deactivate_unseen(cycle_start).await?;
        if unseen > 0 {
            info!("{} 个注册中心本周期未出现，置为不活跃", unseen);
        }

        let (worklist, used_fallback) = if topology.reachable_registries == 0 {
            (self.fallback_worklist().await?, true)
        } else {
            (topology.resources, false)
        };

        let clock = LifecycleClock {
            now: Utc::now(),
            cycle_start,
            fetched_check,
        };
        let mut report = self.dispatcher.dispatch(worklist, clock).await;
        report.cycle = cycle;
        report.reachable_registries = topology.reachable_registries;
        report.used_fallback = used_fallback;

        report.deactivated = self
            .reconciler
            .deactivate_missing(cycle_start, &report.polled_hosts(), &self.context.health)
            .await?;

        if config.stats.enabled {
            if let Err(e) = self.statistics.refresh(Utc::now()).await {
                error!("统计汇总失败: {}", e);
            }
        }

        report.duration = started.elapsed();
        let active = self.context.clusters.list_active().await?.len();
        self.context.metrics.record_cycle(
            report.duration,
            report.polled.len(),
            report.failed.len(),
            report.abandoned.len(),
            active,
        );
        self.context.metrics.record_jobs(
            report.jobs_written(),
            report.jobs_lost(),
            report.jobs_rerun(),
            report.jobs_refused(),
        );
        self.completed_cycles.fetch_add(1, Ordering::SeqCst);

        info!(
            cycle = cycle,
            polled = report.polled.len(),
            failed = report.failed.len(),
            blacklisted = report.blacklisted.len(),
            abandoned = report.abandoned.len(),
            newly_active = report.newly_active().len(),
            deactivated = report.deactivated.len(),
            jobs_written = report.jobs_written(),
            jobs_lost = report.jobs_lost(),
            active_clusters = active,
            duration_ms = report.duration.as_millis() as u64,
            "轮询周期完成"
        );
        Ok(report)
    }

    /// 注册中心全部不可达时，轮询库中已知的活跃集群
    async fn fallback_worklist(&self) -> CacheResult<Vec<Endpoint>> {
        let clusters = self.context.clusters.list_active().await?;
        warn!(
            "没有可达的注册中心，改为轮询 {} 个已知的活跃集群",
            clusters.len()
        );
        Ok(clusters
            .iter()
            .map(|cluster| {
                Endpoint::resource(
                    EndpointId::new(cluster.endpoint_host.clone(), cluster.endpoint_port),
                    cluster_dn(&cluster.hostname),
                    None,
                )
            })
            .collect())
    }

    /// 周期循环：周期耗时短于目标周期时等待剩余时间，超出时立即开始下一个周期
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        let period = self.context.config.poller.period();
        info!("轮询循环已启动，目标周期 {:?}", period);

        loop {
            let started = Instant::now();
            tokio::select! {
                result = self.run_cycle() => {
                    if let Err(e) = result {
                        error!("轮询周期失败: {}", e);
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("收到关闭信号，中断当前轮询周期");
                    break;
                }
            }

            let elapsed = started.elapsed();
            let wait = period.saturating_sub(elapsed);
            if wait.is_zero() {
                self.context.metrics.record_overrun(elapsed, period);
                continue;
            }

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown_rx.recv() => {
                    info!("收到关闭信号，停止轮询循环");
                    break;
                }
            }
        }
    }
}
