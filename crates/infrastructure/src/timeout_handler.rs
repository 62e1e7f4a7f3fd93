//! Timeout handling for directory and store operations
//!
//! Directory timeouts are routine on an unreliable fleet and surface as
//! `DirectoryFailure::Timeout`, so callers treat them like any other endpoint failure.

use infocache_core::traits::DirectoryFailure;
use infocache_core::{CacheError, CacheResult};
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, instrument, warn};

/// Timeout values per operation type
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Whole-endpoint poll (cluster, queues and jobs of one resource)
    pub endpoint_timeout: Duration,
    /// Single store unit of work
    pub store_timeout: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            endpoint_timeout: Duration::from_secs(60),
            store_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TimeoutHandler {
    config: TimeoutConfig,
}

impl TimeoutHandler {
    pub fn new(config: TimeoutConfig) -> Self {
        Self { config }
    }

    pub fn with_default_config() -> Self {
        Self::new(TimeoutConfig::default())
    }

    /// Execute endpoint poll with timeout
    #[instrument(skip(self, operation))]
    pub async fn endpoint_operation<F, T>(&self, operation: F, endpoint: &str) -> CacheResult<T>
    where
        F: Future<Output = CacheResult<T>>,
    {
        match timeout(self.config.endpoint_timeout, operation).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "端点 '{endpoint}' 轮询超时 (超时时间: {:?})",
                    self.config.endpoint_timeout
                );
                Err(CacheError::Directory(DirectoryFailure::Timeout))
            }
        }
    }

    /// Execute store operation with timeout
    #[instrument(skip(self, operation))]
    pub async fn store_operation<F, T>(&self, operation: F, operation_name: &str) -> CacheResult<T>
    where
        F: Future<Output = CacheResult<T>>,
    {
        match timeout(self.config.store_timeout, operation).await {
            Ok(result) => result,
            Err(_) => {
                let error_msg = format!(
                    "数据库操作 '{operation_name}' 超时 (超时时间: {:?})",
                    self.config.store_timeout
                );
                error!("{}", error_msg);
                Err(CacheError::DatabaseOperation(error_msg))
            }
        }
    }
}
