//! # 数据模型
//!
//! 缓存守护进程的核心数据结构：目录条目、端点、集群/队列/作业记录、
//! 授权条目、注册中心元数据和统计汇总。
//!
//! 作业状态的推进规则集中在 [`lifecycle`] 中，作为纯函数实现，
//! 存储层和调度层都不直接修改作业状态。

pub mod access;
pub mod changeset;
pub mod cluster;
pub mod directory;
pub mod endpoint;
pub mod fields;
pub mod job;
pub mod lifecycle;
pub mod queue;
pub mod registry;
pub mod schema;
pub mod stats;

pub use access::{AccessDiff, AccessEntry};
pub use changeset::{ChangesetSummary, ClusterChangeset, CompletedJobUsage, DeactivationSummary};
pub use cluster::{AttributeBag, ClusterRecord, RecordStatus};
pub use directory::{dn_in_scope, normalize_dn, DirectoryRecord, SearchFilter, SearchScope};
pub use endpoint::{Endpoint, EndpointId, EndpointKind, DEFAULT_DIRECTORY_PORT};
pub use fields::{ClusterField, FieldKind, FieldValue, JobField, QueueField, RecordField};
pub use job::{
    map_source_status, JobDetails, JobRecord, JobSnapshot, JobStatus, ObservedState,
    TerminalFamily, RESOLVED_STATUSES,
};
pub use lifecycle::{decide, JobDecision, LifecycleClock};
pub use queue::QueueRecord;
pub use registry::RegistryRecord;
pub use stats::{GroupUsage, StatsLevel, StatsRecord};
