pub mod sqlite_access_repository;
pub mod sqlite_cluster_repository;
pub mod sqlite_job_repository;
pub mod sqlite_queue_repository;
pub mod sqlite_registry_repository;
pub mod sqlite_stats_repository;

#[cfg(test)]
pub(crate) mod test_support;

pub use sqlite_access_repository::SqliteAccessRepository;
pub use sqlite_cluster_repository::SqliteClusterRepository;
pub use sqlite_job_repository::SqliteJobRepository;
pub use sqlite_queue_repository::SqliteQueueRepository;
pub use sqlite_registry_repository::SqliteRegistryRepository;
pub use sqlite_stats_repository::SqliteStatsRepository;
