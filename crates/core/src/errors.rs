use thiserror::Error;

use crate::traits::DirectoryFailure;

/// 缓存守护进程错误类型定义
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("数据库操作错误: {0}")]
    DatabaseOperation(String),

    #[error("目录查询失败: {0}")]
    Directory(#[from] DirectoryFailure),

    #[error("记录格式错误: {0}")]
    Schema(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("集群未找到: {hostname}")]
    ClusterNotFound { hostname: String },

    #[error("已有轮询周期正在执行")]
    CycleInProgress,

    #[error("内部错误: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

impl CacheError {
    /// 端点级别的失败，只需拉黑该端点而不影响整个周期
    pub fn is_endpoint_failure(&self) -> bool {
        matches!(self, CacheError::Directory(_) | CacheError::Schema(_))
    }
}

/// 统一的Result类型
pub type CacheResult<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_failure_is_endpoint_failure() {
        let err: CacheError = DirectoryFailure::Timeout.into();
        assert!(err.is_endpoint_failure());
        assert!(err.to_string().contains("目录查询失败"));
    }

    #[test]
    fn test_store_errors_are_not_endpoint_failures() {
        let err = CacheError::DatabaseOperation("locked".to_string());
        assert!(!err.is_endpoint_failure());
    }

    #[test]
    fn test_serde_error_conversion() {
        let parse: Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: CacheError = parse.unwrap_err().into();
        assert!(matches!(err, CacheError::Serialization(_)));
    }
}
