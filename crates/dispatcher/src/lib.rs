//! 信息缓存的调度层
//!
//! 拓扑发现、端点健康策略、轮询分发、状态对账、授权同步、过期清理和统计汇总。
//! 三个独立的循环（轮询、授权同步、清理）共享同一个 [`CacheContext`]。

pub mod access_sync;
pub mod context;
pub mod controller;
pub mod health;
pub mod housekeeper;
pub mod metrics;
pub mod poller;
pub mod reconciler;
pub mod statistics;
pub mod topology;

#[cfg(test)]
pub mod test_utils;

pub use access_sync::{AccessSyncReport, AccessSynchronizer};
pub use context::CacheContext;
pub use controller::CacheController;
pub use health::HealthPolicy;
pub use housekeeper::{CleanupStats, Housekeeper};
pub use metrics::CacheMetrics;
pub use poller::{fetch_snapshot, CycleReport, PollDispatcher, PollOutcome};
pub use reconciler::{plan_jobs, ClusterSnapshot, QueueSnapshot, ReconcileOutcome, StateReconciler};
pub use statistics::StatisticsAggregator;
pub use topology::{Topology, TopologyResolver};
