use async_trait::async_trait;
use infocache_core::config::models::StatsConfig;
use infocache_core::traits::PrincipalDirectory;
use infocache_core::{CacheError, CacheResult};
use std::collections::BTreeMap;

/// 由配置给出的组成员表
#[derive(Debug, Clone, Default)]
pub struct StaticPrincipalDirectory {
    groups: BTreeMap<String, Vec<String>>,
}

impl StaticPrincipalDirectory {
    pub fn new(groups: BTreeMap<String, Vec<String>>) -> Self {
        Self { groups }
    }

    pub fn from_config(config: &StatsConfig) -> Self {
        Self::new(config.groups.clone())
    }
}

#[async_trait]
impl PrincipalDirectory for StaticPrincipalDirectory {
    async fn list_groups(&self) -> CacheResult<Vec<String>> {
        Ok(self.groups.keys().cloned().collect())
    }

    async fn list_principals(&self, group: &str) -> CacheResult<Vec<String>> {
        self.groups
            .get(group)
            .cloned()
            .ok_or_else(|| CacheError::Configuration(format!("未知的组: {group}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_groups() {
        let mut groups = BTreeMap::new();
        groups.insert("atlas".to_string(), vec!["/CN=Alice".to_string()]);
        groups.insert("cms".to_string(), vec!["/CN=Bob".to_string(), "/CN=Carol".to_string()]);
        let directory = StaticPrincipalDirectory::new(groups);

        assert_eq!(directory.list_groups().await.unwrap(), vec!["atlas", "cms"]);
        assert_eq!(directory.list_principals("cms").await.unwrap().len(), 2);
        assert!(directory.list_principals("lhcb").await.is_err());
    }
}
