//! 配置管理
//!
//! 配置按以下优先级合并：内置默认值 < TOML 配置文件 < `INFOCACHE_` 前缀的环境变量。
//! 每个配置段都提供 `validate()`，任何错误都会在守护进程进入轮询循环之前报告。

pub mod models;

pub use models::{
    AccessSyncConfig, AppConfig, DatabaseConfig, DirectoryConfig, HealthConfig,
    HousekeeperConfig, ObservabilityConfig, PollerConfig, StatsConfig,
};
