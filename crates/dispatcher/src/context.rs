use std::sync::Arc;

use infocache_core::config::AppConfig;
use infocache_core::traits::{
    AccessRepository, ClusterRepository, DirectoryClient, JobRepository, PrincipalDirectory,
    QueueRepository, RegistryRepository, StatsRepository,
};
use infocache_infrastructure::{DatabaseManager, TimeoutConfig, TimeoutHandler};

use crate::health::HealthPolicy;
use crate::metrics::CacheMetrics;

/// 各个循环共享的依赖
#[derive(Clone)]
pub struct CacheContext {
    pub clusters: Arc<dyn ClusterRepository>,
    pub queues: Arc<dyn QueueRepository>,
    pub jobs: Arc<dyn JobRepository>,
    pub access: Arc<dyn AccessRepository>,
    pub stats: Arc<dyn StatsRepository>,
    pub registries: Arc<dyn RegistryRepository>,
    pub directory: Arc<dyn DirectoryClient>,
    pub principals: Arc<dyn PrincipalDirectory>,
    pub health: Arc<HealthPolicy>,
    pub metrics: CacheMetrics,
    pub timeouts: TimeoutHandler,
    pub config: Arc<AppConfig>,
}

impl CacheContext {
    pub fn new(
        database: &DatabaseManager,
        directory: Arc<dyn DirectoryClient>,
        principals: Arc<dyn PrincipalDirectory>,
        config: AppConfig,
    ) -> Self {
        let timeouts = TimeoutHandler::new(TimeoutConfig {
            endpoint_timeout: config.poller.endpoint_timeout(),
            ..TimeoutConfig::default()
        });

        Self {
            clusters: database.cluster_repository(),
            queues: database.queue_repository(),
            jobs: database.job_repository(),
            access: database.access_repository(),
            stats: database.stats_repository(),
            registries: database.registry_repository(),
            directory,
            principals,
            health: Arc::new(HealthPolicy::new(config.health.blacklist_cycles)),
            metrics: CacheMetrics::new(),
            timeouts,
            config: Arc::new(config),
        }
    }
}
