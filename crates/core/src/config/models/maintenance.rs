use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 授权列表同步配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessSyncConfig {
    pub enabled: bool,
    /// 每隔多少个轮询周期做一次全量刷新，其余周期只处理新激活的集群
    pub full_refresh_cycles: u64,
}

impl Default for AccessSyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            full_refresh_cycles: 15,
        }
    }
}

impl AccessSyncConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.full_refresh_cycles == 0 {
            return Err(anyhow::anyhow!("全量刷新周期必须大于0"));
        }
        Ok(())
    }
}

/// 过期数据清理配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HousekeeperConfig {
    pub enabled: bool,
    /// 清理间隔（秒）
    pub period_seconds: u64,
    /// 非活跃集群保留时长（秒）
    pub inactive_cluster_retention_seconds: i64,
    /// 已取回/已删除/丢失作业保留时长（秒）
    pub resolved_job_retention_seconds: i64,
}

impl Default for HousekeeperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            period_seconds: 3600,                           // 1小时
            inactive_cluster_retention_seconds: 14 * 86400, // 14天
            resolved_job_retention_seconds: 86400,          // 1天
        }
    }
}

impl HousekeeperConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.period_seconds == 0 {
            return Err(anyhow::anyhow!("清理间隔必须大于0"));
        }

        if self.inactive_cluster_retention_seconds <= 0 || self.resolved_job_retention_seconds <= 0 {
            return Err(anyhow::anyhow!("保留时长必须大于0"));
        }

        Ok(())
    }

    pub fn inactive_cluster_retention(&self) -> Duration {
        Duration::seconds(self.inactive_cluster_retention_seconds)
    }

    pub fn resolved_job_retention(&self) -> Duration {
        Duration::seconds(self.resolved_job_retention_seconds)
    }
}

/// 统计汇总配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    pub enabled: bool,
    /// 顶层汇总记录的名称
    pub grid_name: String,
    /// 按组统计使用量的时间窗口（小时）
    pub usage_window_hours: i64,
    /// 组 -> 成员列表，供静态成员目录使用
    pub groups: BTreeMap<String, Vec<String>>,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            grid_name: "NorduGrid".to_string(),
            usage_window_hours: 24,
            groups: BTreeMap::new(),
        }
    }
}

impl StatsConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.grid_name.trim().is_empty() {
            return Err(anyhow::anyhow!("统计名称不能为空"));
        }
        if self.usage_window_hours <= 0 {
            return Err(anyhow::anyhow!("使用量统计窗口必须大于0"));
        }
        Ok(())
    }

    pub fn usage_window(&self) -> Duration {
        Duration::hours(self.usage_window_hours)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_housekeeper_defaults() {
        let config = HousekeeperConfig::default();
        assert_eq!(config.inactive_cluster_retention(), Duration::days(14));
        assert_eq!(config.resolved_job_retention(), Duration::days(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_housekeeper_rejects_negative_retention() {
        let config = HousekeeperConfig {
            resolved_job_retention_seconds: -1,
            ..HousekeeperConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_access_sync_rejects_zero_cycle() {
        let config = AccessSyncConfig {
            enabled: true,
            full_refresh_cycles: 0,
        };
        assert!(config.validate().is_err());
    }
}
