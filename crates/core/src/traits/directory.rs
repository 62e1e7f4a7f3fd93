use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::models::{DirectoryRecord, EndpointId, SearchFilter, SearchScope};

/// 目录查询失败原因
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DirectoryFailure {
    #[error("端点不可达: {0}")]
    Unreachable(String),

    #[error("查询超时")]
    Timeout,

    #[error("查询基点不存在")]
    NoSuchObject,
}

/// 一次目录搜索
#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryQuery {
    pub base: String,
    pub scope: SearchScope,
    pub filter: SearchFilter,
    /// 需要返回的属性，为空时返回全部
    pub attributes: Vec<String>,
}

impl DirectoryQuery {
    pub fn subtree(base: impl Into<String>, filter: SearchFilter) -> Self {
        Self {
            base: base.into(),
            scope: SearchScope::Subtree,
            filter,
            attributes: Vec::new(),
        }
    }

    /// 只查询基点的直接下级
    pub fn one_level(base: impl Into<String>, filter: SearchFilter) -> Self {
        Self {
            base: base.into(),
            scope: SearchScope::OneLevel,
            filter,
            attributes: Vec::new(),
        }
    }

    pub fn with_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = attributes.into_iter().map(Into::into).collect();
        self
    }
}

/// 目录服务客户端
///
/// 线协议客户端和测试用的内存实现都通过此接口接入。
/// 实现需要保证 `timeout` 到期时返回 [`DirectoryFailure::Timeout`]。
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    async fn query(
        &self,
        endpoint: &EndpointId,
        query: &DirectoryQuery,
        timeout: Duration,
    ) -> Result<Vec<DirectoryRecord>, DirectoryFailure>;
}
