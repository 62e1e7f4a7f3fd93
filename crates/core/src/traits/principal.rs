use async_trait::async_trait;

use crate::errors::CacheResult;

/// 主体（用户）到组的查询服务，用于统计中的按组用量
#[async_trait]
pub trait PrincipalDirectory: Send + Sync {
    async fn list_groups(&self) -> CacheResult<Vec<String>>;

    /// 组内的全部主体标识
    async fn list_principals(&self, group: &str) -> CacheResult<Vec<String>>;
}
