use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 持久化存储配置（SQLite）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// 形如 `sqlite://infocache.db` 或 `sqlite::memory:`
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout_seconds: u64,
    pub idle_timeout_seconds: u64,
    /// 写锁被占用时的等待时间，清理和轮询可能同时写库
    pub busy_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://infocache.db".to_string(),
            max_connections: 10,
            min_connections: 1,
            connection_timeout_seconds: 30,
            idle_timeout_seconds: 600,
            busy_timeout_seconds: 10,
        }
    }
}

impl DatabaseConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.url.starts_with("sqlite:") {
            return Err(anyhow::anyhow!("存储URL必须是SQLite格式: {:?}", self.url));
        }

        if self.max_connections == 0 || self.min_connections > self.max_connections {
            return Err(anyhow::anyhow!(
                "连接数配置无效: min={} max={}",
                self.min_connections,
                self.max_connections
            ));
        }

        if self.connection_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("连接超时时间必须大于0"));
        }

        Ok(())
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_seconds)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_secs(self.busy_timeout_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_sqlite_urls_accepted() {
        assert!(DatabaseConfig::default().validate().is_ok());

        let config = DatabaseConfig {
            url: "postgres://localhost/cache".to_string(),
            ..DatabaseConfig::default()
        };
        assert!(config.validate().is_err());

        let config = DatabaseConfig {
            url: String::new(),
            ..DatabaseConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_connection_bounds() {
        let config = DatabaseConfig {
            min_connections: 5,
            max_connections: 2,
            ..DatabaseConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
