//! 授权列表同步
//!
//! 与轮询循环独立运行。每隔 `full_refresh_cycles` 个节拍对全部活跃集群做一次全量刷新，
//! 其余节拍只处理尚未同步过的集群（新激活或重新激活的集群）。
//! 一个集群的全部队列都同步成功后才标记为已同步，失败的集群下次节拍重试。

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use infocache_core::models::schema::{users_base, AUTHUSER_OBJECT_CLASS, AUTHUSER_SN_ATTR};
use infocache_core::models::{AccessDiff, ClusterRecord, SearchFilter};
use infocache_core::traits::{DirectoryFailure, DirectoryQuery};
use infocache_core::{CacheError, CacheResult};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::context::CacheContext;

/// 一次同步节拍的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessSyncReport {
    pub tick: u64,
    pub full_refresh: bool,
    pub clusters_synced: Vec<String>,
    pub clusters_failed: Vec<String>,
    pub clusters_skipped: Vec<String>,
    pub diff: AccessDiff,
}

pub struct AccessSynchronizer {
    context: CacheContext,
    ticks: AtomicU64,
}

impl AccessSynchronizer {
    pub fn new(context: CacheContext) -> Self {
        Self {
            context,
            ticks: AtomicU64::new(0),
        }
    }

    /// 执行一次同步节拍，第一次节拍总是全量刷新
    pub async fn run_once(&self) -> CacheResult<AccessSyncReport> {
        let tick = self.ticks.fetch_add(1, Ordering::SeqCst);
        let full_refresh = tick % self.context.config.access_sync.full_refresh_cycles.max(1) == 0;

        let clusters = if full_refresh {
            self.context.clusters.list_active().await?
        } else {
            self.context.clusters.list_pending_access_sync().await?
        };

        let mut report = AccessSyncReport {
            tick,
            full_refresh,
            ..AccessSyncReport::default()
        };

        for cluster in clusters {
            if self.context.health.peek_blacklisted(&cluster.endpoint_host).await {
                debug!("集群 {} 的端点被拉黑，跳过授权同步", cluster.hostname);
                report.clusters_skipped.push(cluster.hostname);
                continue;
            }

            match self.sync_cluster(&cluster).await {
                Ok(diff) => {
                    report.diff.merge(diff);
                    report.clusters_synced.push(cluster.hostname);
                }
                Err(e) if e.is_endpoint_failure() => {
                    warn!("集群 {} 授权列表查询失败: {}", cluster.hostname, e);
                    self.context.health.blacklist(&cluster.endpoint_host).await;
                    report.clusters_failed.push(cluster.hostname);
                }
                Err(CacheError::ClusterNotFound { hostname }) => {
                    debug!("集群 {} 在同步期间被删除", hostname);
                    report.clusters_skipped.push(hostname);
                }
                Err(e) => {
                    error!("集群 {} 授权列表写入失败: {}", cluster.hostname, e);
                    report.clusters_failed.push(cluster.hostname);
                }
            }
        }

        self.context
            .metrics
            .record_access_sync(report.diff.added, report.diff.removed);
        info!(
            tick = tick,
            full_refresh = full_refresh,
            synced = report.clusters_synced.len(),
            failed = report.clusters_failed.len(),
            skipped = report.clusters_skipped.len(),
            added = report.diff.added,
            removed = report.diff.removed,
            "授权列表同步完成"
        );
        Ok(report)
    }

    async fn sync_cluster(&self, cluster: &ClusterRecord) -> CacheResult<AccessDiff> {
        let endpoint = cluster.endpoint();
        let queues = self.context.queues.list_for_cluster(&cluster.hostname).await?;
        let mut diff = AccessDiff::default();

        for queue in queues.iter().filter(|q| q.is_active()) {
            let query = DirectoryQuery::one_level(
                users_base(&cluster.hostname, &queue.name),
                SearchFilter::object_class(AUTHUSER_OBJECT_CLASS),
            )
            .with_attributes([AUTHUSER_SN_ATTR]);

            let entries = match self
                .context
                .directory
                .query(&endpoint, &query, self.context.config.directory.query_timeout())
                .await
            {
                Ok(entries) => entries,
                Err(DirectoryFailure::NoSuchObject) => {
                    debug!("集群 {} 队列 {} 没有授权分组", cluster.hostname, queue.name);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let principals: Vec<String> = entries
                .iter()
                .flat_map(|entry| entry.values(AUTHUSER_SN_ATTR).iter())
                .map(|sn| sn.trim())
                .filter(|sn| !sn.is_empty())
                .map(str::to_string)
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();

            let queue_diff = self
                .context
                .access
                .replace_for_queue(&cluster.hostname, &queue.name, &principals, Utc::now())
                .await?;
            if !queue_diff.is_empty() {
                debug!(
                    "集群 {} 队列 {} 授权列表: +{} -{}",
                    cluster.hostname, queue.name, queue_diff.added, queue_diff.removed
                );
            }
            diff.merge(queue_diff);
        }

        self.context
            .clusters
            .mark_access_synced(&cluster.hostname, Utc::now())
            .await?;
        Ok(diff)
    }

    /// 按轮询周期运行，直到收到关闭信号
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        let period: Duration = self.context.config.poller.period();
        let mut interval = tokio::time::interval(period);
        info!("授权列表同步已启动，间隔 {:?}", period);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.run_once().await {
                        error!("授权列表同步失败: {}", e);
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("收到关闭信号，停止授权列表同步");
                    break;
                }
            }
        }
    }
}
