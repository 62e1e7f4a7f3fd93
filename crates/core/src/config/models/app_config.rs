use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    database::DatabaseConfig,
    directory::DirectoryConfig,
    maintenance::{AccessSyncConfig, HousekeeperConfig, StatsConfig},
    observability::ObservabilityConfig,
    poller::{HealthConfig, PollerConfig},
};

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub directory: DirectoryConfig,
    pub poller: PollerConfig,
    pub health: HealthConfig,
    pub access_sync: AccessSyncConfig,
    pub housekeeper: HousekeeperConfig,
    pub stats: StatsConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load configuration from config file and environment variables
    ///
    /// Load order:
    /// 1. Default configuration
    /// 2. Config file (TOML format)
    /// 3. Environment variable overrides (prefix: INFOCACHE_, nested keys joined by `__`,
    ///    e.g. `INFOCACHE_POLLER__PERIOD_SECONDS=60`)
    ///
    /// # Arguments
    ///
    /// * `config_path` - Config file path, if None use default paths
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        // 1. Load config file if provided
        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else {
            let default_paths = [
                "config/infocache.toml",
                "infocache.toml",
                "/etc/infocache/config.toml",
            ];

            for path in &default_paths {
                if Path::new(path).exists() {
                    builder = builder.add_source(File::new(path, FileFormat::Toml));
                    break;
                }
            }
        }

        // 2. Environment variable overrides - highest priority
        builder = builder.add_source(
            Environment::with_prefix("INFOCACHE")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("directory.roots")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    /// Validate configuration effectiveness
    pub fn validate(&self) -> Result<()> {
        self.database.validate().context("数据库配置验证失败")?;
        self.directory.validate().context("目录服务配置验证失败")?;
        self.poller.validate().context("轮询配置验证失败")?;
        self.health.validate().context("健康策略配置验证失败")?;
        self.access_sync
            .validate()
            .context("授权同步配置验证失败")?;
        self.housekeeper.validate().context("清理配置验证失败")?;
        self.stats.validate().context("统计配置验证失败")?;
        self.observability
            .validate()
            .context("可观测性配置验证失败")?;

        Ok(())
    }
}
