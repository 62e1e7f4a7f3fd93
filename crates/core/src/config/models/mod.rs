pub mod app_config;
pub mod database;
pub mod directory;
pub mod maintenance;
pub mod observability;
pub mod poller;

// Re-export main types for easier imports
pub use app_config::AppConfig;
pub use database::DatabaseConfig;
pub use directory::DirectoryConfig;
pub use maintenance::{AccessSyncConfig, HousekeeperConfig, StatsConfig};
pub use observability::ObservabilityConfig;
pub use poller::{HealthConfig, PollerConfig};
