use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 轮询周期配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// 目标轮询周期（秒）
    pub period_seconds: u64,
    /// 并发轮询的工作者数量
    pub max_workers: usize,
    /// 单个端点（集群+队列+作业）的抓取超时（秒）
    pub endpoint_timeout_seconds: u64,
    /// 整个周期的截止时间（秒），超时后放弃剩余端点
    pub cycle_deadline_seconds: u64,
    /// 每隔多少个周期检查一次已结束作业是否被取回
    pub fetched_check_cycles: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            period_seconds: 120,
            max_workers: 10,
            endpoint_timeout_seconds: 60,
            cycle_deadline_seconds: 300,
            fetched_check_cycles: 10,
        }
    }
}

impl PollerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.period_seconds == 0 {
            return Err(anyhow::anyhow!("轮询周期必须大于0"));
        }

        if self.max_workers == 0 {
            return Err(anyhow::anyhow!("工作者数量必须大于0"));
        }

        if self.endpoint_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("端点超时时间必须大于0"));
        }

        if self.cycle_deadline_seconds < self.endpoint_timeout_seconds {
            return Err(anyhow::anyhow!(
                "周期截止时间({})不能小于端点超时时间({})",
                self.cycle_deadline_seconds,
                self.endpoint_timeout_seconds
            ));
        }

        if self.fetched_check_cycles == 0 {
            return Err(anyhow::anyhow!("取回检查周期必须大于0"));
        }

        Ok(())
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_seconds)
    }

    pub fn endpoint_timeout(&self) -> Duration {
        Duration::from_secs(self.endpoint_timeout_seconds)
    }

    pub fn cycle_deadline(&self) -> Duration {
        Duration::from_secs(self.cycle_deadline_seconds)
    }
}

/// 端点健康策略配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// 失败后被拉黑的周期数
    pub blacklist_cycles: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            blacklist_cycles: 2,
        }
    }
}

impl HealthConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.blacklist_cycles == 0 {
            return Err(anyhow::anyhow!("拉黑周期数必须大于0"));
        }
        Ok(())
    }
}
