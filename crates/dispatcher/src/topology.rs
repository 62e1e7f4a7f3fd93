//! 拓扑发现
//!
//! 从根注册中心出发做广度优先遍历。每个注册中心上以
//! `(Mds-Service-hn=*)` 查询下级注册项，后缀指向计算资源的作为轮询目标，
//! 其余作为下级注册中心继续遍历。已访问集合保证环状注册关系下遍历终止，
//! 最大深度限制异常深的注册链。

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use infocache_core::models::schema::{
    is_resource_suffix, SERVICE_HOST_ATTR, SERVICE_PORT_ATTR, SERVICE_SUFFIX_ATTR,
};
use infocache_core::models::{
    DirectoryRecord, Endpoint, EndpointId, RecordStatus, RegistryRecord, SearchFilter,
};
use infocache_core::traits::{DirectoryClient, DirectoryQuery};
use tracing::{debug, info, warn};

use crate::context::CacheContext;
use crate::health::HealthPolicy;
use crate::metrics::CacheMetrics;

/// 一次拓扑发现的结果
#[derive(Debug, Clone, Default)]
pub struct Topology {
    /// 去重后的计算资源，按发现顺序排列
    pub resources: Vec<Endpoint>,
    /// 本次访问过的注册中心，包括失败和被拉黑的
    pub registries: Vec<RegistryRecord>,
    /// 成功应答的注册中心数量
    pub reachable_registries: usize,
}

pub struct TopologyResolver {
    directory: Arc<dyn DirectoryClient>,
    health: Arc<HealthPolicy>,
    metrics: CacheMetrics,
    query_timeout: Duration,
    default_port: u16,
    max_depth: usize,
}

impl TopologyResolver {
    pub fn new(context: &CacheContext) -> Self {
        let directory = &context.config.directory;
        Self {
            directory: context.directory.clone(),
            health: context.health.clone(),
            metrics: context.metrics.clone(),
            query_timeout: directory.query_timeout(),
            default_port: directory.default_port,
            max_depth: directory.max_discovery_depth,
        }
    }

    /// 从根注册中心发现全部计算资源
    pub async fn resolve(&self, roots: &[EndpointId], base: &str) -> Topology {
        let mut topology = Topology::default();
        let mut visited: HashSet<EndpointId> = HashSet::new();
        let mut seen_resources: HashSet<EndpointId> = HashSet::new();
        let mut pending: VecDeque<(Endpoint, usize)> = VecDeque::new();

        for root in roots {
            if visited.insert(root.clone()) {
                pending.push_back((Endpoint::registry(root.clone(), base, None), 0));
            }
        }

        while let Some((registry, depth)) = pending.pop_front() {
            if self.health.is_blacklisted(registry.host()).await {
                debug!("跳过被拉黑的注册中心 {}", registry.id);
                topology.registries.push(self.observation(&registry, None, true));
                continue;
            }

            let query = DirectoryQuery::subtree(
                registry.base.clone(),
                SearchFilter::present(SERVICE_HOST_ATTR),
            )
            .with_attributes([SERVICE_HOST_ATTR, SERVICE_PORT_ATTR, SERVICE_SUFFIX_ATTR]);

            let started = Instant::now();
            let records = match self
                .directory
                .query(&registry.id, &query, self.query_timeout)
                .await
            {
                Ok(records) => records,
                Err(e) => {
                    warn!("注册中心 {} 查询失败: {}", registry.id, e);
                    self.health.blacklist(registry.host()).await;
                    topology.registries.push(self.observation(&registry, None, true));
                    continue;
                }
            };
            let elapsed = started.elapsed().as_secs_f64();
            self.health.record_response_time(registry.host(), elapsed).await;
            self.metrics.record_response_time(elapsed);
            topology.reachable_registries += 1;
            topology
                .registries
                .push(self.observation(&registry, Some(elapsed), false));

            for record in &records {
                let Some((id, suffix)) = self.parse_entry(record) else {
                    continue;
                };

                if is_resource_suffix(&suffix) {
                    if seen_resources.insert(id.clone()) {
                        topology.resources.push(Endpoint::resource(
                            id,
                            suffix,
                            Some(registry.id.clone()),
                        ));
                    }
                } else if depth + 1 > self.max_depth {
                    warn!(
                        "注册中心 {} 超出最大发现深度 {}，不再展开",
                        id, self.max_depth
                    );
                } else if visited.insert(id.clone()) {
                    pending.push_back((
                        Endpoint::registry(id, suffix, Some(registry.id.clone())),
                        depth + 1,
                    ));
                }
            }
        }

        info!(
            resources = topology.resources.len(),
            registries = topology.registries.len(),
            reachable = topology.reachable_registries,
            "拓扑发现完成"
        );
        topology
    }

    /// 解析一条注册项，缺少主机名或端口无效的项被跳过
    fn parse_entry(&self, record: &DirectoryRecord) -> Option<(EndpointId, String)> {
        let host = record
            .first(SERVICE_HOST_ATTR)
            .map(|h| h.trim().to_ascii_lowercase())
            .filter(|h| !h.is_empty());
        let Some(host) = host else {
            warn!("注册项缺少主机名: {}", record.dn);
            return None;
        };

        let port = match record.first(SERVICE_PORT_ATTR) {
            None => self.default_port,
            Some(raw) => match raw.trim().parse::<u16>() {
                Ok(port) => port,
                Err(_) => {
                    warn!("注册项 {} 的端口无效: {}", record.dn, raw);
                    return None;
                }
            },
        };

        let suffix = record.first(SERVICE_SUFFIX_ATTR).unwrap_or_default().trim().to_string();
        Some((EndpointId::new(host, port), suffix))
    }

    fn observation(
        &self,
        registry: &Endpoint,
        response_time: Option<f64>,
        blacklisted: bool,
    ) -> RegistryRecord {
        RegistryRecord {
            hostname: registry.id.host.clone(),
            port: registry.id.port,
            base: registry.base.clone(),
            status: RecordStatus::Active,
            response_time,
            processing_time: None,
            blacklisted,
            last_modified: Utc::now(),
        }
    }
}
