//! 内存目录服务
//!
//! 按端点保存一组目录条目，支持注入失败和响应延迟，可以从 JSON 夹具文件加载。
//! 查询基点的存在性判断：有条目位于基点或其下，或者基点的父条目本身存在
//! （对应信息树中的空分组，如没有作业的 `nordugrid-info-group-name=jobs`）。

use async_trait::async_trait;
use infocache_core::models::{dn_in_scope, normalize_dn, DirectoryRecord, EndpointId, SearchScope};
use infocache_core::traits::{DirectoryClient, DirectoryFailure, DirectoryQuery};
use infocache_core::{CacheError, CacheResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// 夹具中可注入的失败
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixtureFailure {
    Unreachable,
    Timeout,
    NoSuchObject,
}

impl From<FixtureFailure> for DirectoryFailure {
    fn from(failure: FixtureFailure) -> Self {
        match failure {
            FixtureFailure::Unreachable => DirectoryFailure::Unreachable("夹具注入".to_string()),
            FixtureFailure::Timeout => DirectoryFailure::Timeout,
            FixtureFailure::NoSuchObject => DirectoryFailure::NoSuchObject,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureEndpoint {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub failure: Option<FixtureFailure>,
    #[serde(default)]
    pub delay_ms: u64,
    #[serde(default)]
    pub records: Vec<DirectoryRecord>,
}

fn default_port() -> u16 {
    infocache_core::models::DEFAULT_DIRECTORY_PORT
}

/// 夹具文件格式
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectoryFixture {
    #[serde(default)]
    pub endpoints: Vec<FixtureEndpoint>,
}

#[derive(Debug, Clone, Default)]
struct EndpointState {
    records: Vec<DirectoryRecord>,
    failure: Option<DirectoryFailure>,
    delay: Duration,
    queries: u64,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryDirectory {
    endpoints: Arc<RwLock<HashMap<EndpointId, EndpointState>>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fixture(fixture: DirectoryFixture) -> Self {
        let endpoints = fixture
            .endpoints
            .into_iter()
            .map(|endpoint| {
                let id = EndpointId::new(endpoint.host.to_ascii_lowercase(), endpoint.port);
                let state = EndpointState {
                    records: endpoint
                        .records
                        .into_iter()
                        .map(DirectoryRecord::normalized)
                        .collect(),
                    failure: endpoint.failure.map(Into::into),
                    delay: Duration::from_millis(endpoint.delay_ms),
                    queries: 0,
                };
                (id, state)
            })
            .collect();

        Self {
            endpoints: Arc::new(RwLock::new(endpoints)),
        }
    }

    pub fn from_json(json: &str) -> CacheResult<Self> {
        let fixture: DirectoryFixture = serde_json::from_str(json)
            .map_err(|e| CacheError::Configuration(format!("解析目录夹具失败: {e}")))?;
        Ok(Self::from_fixture(fixture))
    }

    pub async fn load(path: impl AsRef<Path>) -> CacheResult<Self> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path).await.map_err(|e| {
            CacheError::Configuration(format!("读取目录夹具失败 {}: {e}", path.display()))
        })?;
        let directory = Self::from_json(&json)?;
        info!(
            "加载目录夹具: {} ({} 个端点)",
            path.display(),
            directory.endpoints.read().await.len()
        );
        Ok(directory)
    }

    /// 替换端点上的全部条目
    pub async fn set_records(&self, endpoint: &EndpointId, records: Vec<DirectoryRecord>) {
        let mut endpoints = self.endpoints.write().await;
        endpoints.entry(endpoint.clone()).or_default().records =
            records.into_iter().map(DirectoryRecord::normalized).collect();
    }

    /// 新增或替换同 DN 的条目
    pub async fn upsert_record(&self, endpoint: &EndpointId, record: DirectoryRecord) {
        let record = record.normalized();
        let dn = normalize_dn(&record.dn);
        let mut endpoints = self.endpoints.write().await;
        let state = endpoints.entry(endpoint.clone()).or_default();
        state.records.retain(|existing| normalize_dn(&existing.dn) != dn);
        state.records.push(record);
    }

    /// 删除某个 DN 及其下的全部条目
    pub async fn remove_subtree(&self, endpoint: &EndpointId, dn: &str) {
        let mut endpoints = self.endpoints.write().await;
        if let Some(state) = endpoints.get_mut(endpoint) {
            state
                .records
                .retain(|record| !dn_in_scope(&record.dn, dn, SearchScope::Subtree));
        }
    }

    pub async fn set_failure(&self, endpoint: &EndpointId, failure: Option<DirectoryFailure>) {
        let mut endpoints = self.endpoints.write().await;
        endpoints.entry(endpoint.clone()).or_default().failure = failure;
    }

    pub async fn set_delay(&self, endpoint: &EndpointId, delay: Duration) {
        let mut endpoints = self.endpoints.write().await;
        endpoints.entry(endpoint.clone()).or_default().delay = delay;
    }

    /// 端点收到的查询次数
    pub async fn query_count(&self, endpoint: &EndpointId) -> u64 {
        self.endpoints
            .read()
            .await
            .get(endpoint)
            .map(|state| state.queries)
            .unwrap_or(0)
    }

    fn base_exists(records: &[DirectoryRecord], base: &str) -> bool {
        if records
            .iter()
            .any(|record| dn_in_scope(&record.dn, base, SearchScope::Subtree))
        {
            return true;
        }
        match normalize_dn(base).split_once(',') {
            Some((_, parent)) => records.iter().any(|record| normalize_dn(&record.dn) == parent),
            None => false,
        }
    }
}

#[async_trait]
impl DirectoryClient for InMemoryDirectory {
    async fn query(
        &self,
        endpoint: &EndpointId,
        query: &DirectoryQuery,
        timeout: Duration,
    ) -> Result<Vec<DirectoryRecord>, DirectoryFailure> {
        let state = {
            let mut endpoints = self.endpoints.write().await;
            match endpoints.get_mut(endpoint) {
                Some(state) => {
                    state.queries += 1;
                    state.clone()
                }
                None => {
                    return Err(DirectoryFailure::Unreachable(format!("未知主机: {endpoint}")));
                }
            }
        };

        if !state.delay.is_zero() {
            if state.delay >= timeout {
                tokio::time::sleep(timeout).await;
                return Err(DirectoryFailure::Timeout);
            }
            tokio::time::sleep(state.delay).await;
        }

        if let Some(failure) = state.failure {
            return Err(failure);
        }

        if !Self::base_exists(&state.records, &query.base) {
            return Err(DirectoryFailure::NoSuchObject);
        }

        let results: Vec<DirectoryRecord> = state
            .records
            .iter()
            .filter(|record| dn_in_scope(&record.dn, &query.base, query.scope))
            .filter(|record| query.filter.matches(record))
            .map(|record| record.project(&query.attributes))
            .collect();

        debug!(
            "目录查询 {} base={} filter={} 返回 {} 条",
            endpoint,
            query.base,
            query.filter,
            results.len()
        );
        Ok(results)
    }
}
