use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::models::{EndpointId, DEFAULT_DIRECTORY_PORT};

/// 目录服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// 根注册中心列表，格式 host[:port]
    pub roots: Vec<String>,
    /// 根注册中心的VO名称或完整base
    pub mds_vo_name: String,
    pub default_port: u16,
    /// 建立连接的超时时间（秒）
    pub network_timeout_seconds: u64,
    /// 单次查询的超时时间（秒）
    pub request_timeout_seconds: u64,
    /// 注册中心递归发现的最大深度
    pub max_discovery_depth: usize,
    /// 离线目录数据文件（JSON），用于无网络环境和测试
    pub fixture_path: Option<String>,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            mds_vo_name: "NorduGrid".to_string(),
            default_port: DEFAULT_DIRECTORY_PORT,
            network_timeout_seconds: 10,
            request_timeout_seconds: 20,
            max_discovery_depth: 8,
            fixture_path: None,
        }
    }
}

impl DirectoryConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.roots.is_empty() {
            return Err(anyhow::anyhow!("至少需要配置一个根注册中心"));
        }

        for root in &self.roots {
            EndpointId::parse(root, self.default_port)
                .map_err(|e| anyhow::anyhow!("根注册中心地址无效: {root} ({e})"))?;
        }

        if self.mds_vo_name.trim().is_empty() {
            return Err(anyhow::anyhow!("mds_vo_name不能为空"));
        }

        if self.network_timeout_seconds == 0 || self.request_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("目录查询超时时间必须大于0"));
        }

        if self.max_discovery_depth == 0 {
            return Err(anyhow::anyhow!("最大发现深度必须大于0"));
        }

        Ok(())
    }

    /// 解析后的根注册中心
    pub fn root_endpoints(&self) -> anyhow::Result<Vec<EndpointId>> {
        self.roots
            .iter()
            .map(|root| {
                EndpointId::parse(root, self.default_port)
                    .map_err(|e| anyhow::anyhow!("根注册中心地址无效: {root} ({e})"))
            })
            .collect()
    }

    /// 根注册中心的查询base
    pub fn root_base(&self) -> String {
        let name = self.mds_vo_name.trim();
        if name.to_ascii_lowercase().contains("mds-vo-name") {
            name.to_string()
        } else {
            format!("Mds-Vo-name={name},o=grid")
        }
    }

    /// 单次目录调用的总超时
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.network_timeout_seconds + self.request_timeout_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_base_from_vo_name() {
        let config = DirectoryConfig::default();
        assert_eq!(config.root_base(), "Mds-Vo-name=NorduGrid,o=grid");

        let config = DirectoryConfig {
            mds_vo_name: "Mds-Vo-name=Sweden,o=grid".to_string(),
            ..DirectoryConfig::default()
        };
        assert_eq!(config.root_base(), "Mds-Vo-name=Sweden,o=grid");
    }

    #[test]
    fn test_validate_requires_roots() {
        let config = DirectoryConfig::default();
        assert!(config.validate().is_err());

        let config = DirectoryConfig {
            roots: vec!["index.example.org".to_string(), "index2.example.org:2136".to_string()],
            ..DirectoryConfig::default()
        };
        assert!(config.validate().is_ok());
        let roots = config.root_endpoints().unwrap();
        assert_eq!(roots[0].port, 2135);
        assert_eq!(roots[1].port, 2136);
    }

    #[test]
    fn test_validate_rejects_bad_port() {
        let config = DirectoryConfig {
            roots: vec!["index.example.org:notaport".to_string()],
            ..DirectoryConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
