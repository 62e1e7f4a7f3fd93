//! 存储层接口定义
//!
//! 每个接口负责一类实体。写入以一个工作单元为事务边界：
//! 一个集群的一次对账、一次下线、一个队列的授权替换或一条清理语句。
//! 任何写入失败都会整体回滚，下个周期重试。

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::CacheResult;
use crate::models::{
    AccessDiff, AccessEntry, ChangesetSummary, ClusterChangeset, ClusterRecord,
    CompletedJobUsage, DeactivationSummary, JobRecord, QueueRecord, RegistryRecord, StatsRecord,
};

/// 集群仓储接口
#[async_trait]
pub trait ClusterRepository: Send + Sync {
    /// 在一个事务中提交集群、队列和作业的变更
    ///
    /// - 集群此前不存在或不活跃时清空 `access_synced_at`，并在结果中标记 `reactivated`
    /// - 不在 `present_queues` 中的队列置为不活跃，删除其授权条目
    /// - 作业写入不会覆盖已解决的记录
    async fn apply_changeset(&self, changeset: &ClusterChangeset) -> CacheResult<ChangesetSummary>;

    /// 将集群及其队列置为不活跃，删除其授权条目
    async fn deactivate(
        &self,
        hostname: &str,
        blacklisted: bool,
        now: DateTime<Utc>,
    ) -> CacheResult<DeactivationSummary>;

    async fn get(&self, hostname: &str) -> CacheResult<Option<ClusterRecord>>;

    async fn list_active(&self) -> CacheResult<Vec<ClusterRecord>>;

    /// 最后修改时间早于 `before` 的活跃集群
    async fn list_stale_active(&self, before: DateTime<Utc>) -> CacheResult<Vec<ClusterRecord>>;

    /// 尚未同步授权列表的活跃集群
    async fn list_pending_access_sync(&self) -> CacheResult<Vec<ClusterRecord>>;

    async fn mark_access_synced(&self, hostname: &str, at: DateTime<Utc>) -> CacheResult<()>;

    /// 删除最后修改时间不晚于 `before` 的不活跃集群，队列和授权条目级联删除
    async fn purge_inactive(&self, before: DateTime<Utc>) -> CacheResult<u64>;
}

/// 队列仓储接口
#[async_trait]
pub trait QueueRepository: Send + Sync {
    async fn list_for_cluster(&self, hostname: &str) -> CacheResult<Vec<QueueRecord>>;

    async fn list_active(&self) -> CacheResult<Vec<QueueRecord>>;
}

/// 作业仓储接口
#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn get(&self, global_id: &str) -> CacheResult<Option<JobRecord>>;

    /// 集群下所有尚未解决的作业
    async fn list_unresolved_for_cluster(&self, hostname: &str) -> CacheResult<Vec<JobRecord>>;

    /// 删除最后修改时间不晚于 `before` 的 `_FETCHED`/`_DELETED` 作业
    async fn purge_resolved(&self, before: DateTime<Utc>) -> CacheResult<u64>;

    /// 删除完成时间不晚于 `before` 的 `LOST` 作业
    async fn purge_lost(&self, before: DateTime<Utc>) -> CacheResult<u64>;

    /// 完成时间不早于 `since` 的作业用量
    async fn list_completed_since(&self, since: DateTime<Utc>) -> CacheResult<Vec<CompletedJobUsage>>;
}

/// 授权列表仓储接口
#[async_trait]
pub trait AccessRepository: Send + Sync {
    /// 用给定主体集合整体替换某队列的授权条目
    async fn replace_for_queue(
        &self,
        hostname: &str,
        queue_name: &str,
        principals: &[String],
        now: DateTime<Utc>,
    ) -> CacheResult<AccessDiff>;

    async fn list_for_cluster(&self, hostname: &str) -> CacheResult<Vec<AccessEntry>>;
}

/// 统计仓储接口
#[async_trait]
pub trait StatsRepository: Send + Sync {
    /// 整体替换同名的汇总
    async fn replace(&self, stats: &StatsRecord) -> CacheResult<()>;

    async fn latest(&self, name: &str) -> CacheResult<Option<StatsRecord>>;
}

/// 注册中心元数据仓储接口
#[async_trait]
pub trait RegistryRepository: Send + Sync {
    async fn upsert_observations(&self, registries: &[RegistryRecord]) -> CacheResult<u64>;

    /// 将最后修改时间早于 `before` 的活跃注册中心置为不活跃
    async fn deactivate_unseen(&self, before: DateTime<Utc>) -> CacheResult<u64>;

    async fn purge_inactive(&self, before: DateTime<Utc>) -> CacheResult<u64>;

    async fn list(&self) -> CacheResult<Vec<RegistryRecord>>;
}
