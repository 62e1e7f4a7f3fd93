use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::cluster::ClusterRecord;
use crate::models::queue::QueueRecord;

/// 集群级计数器
pub const CLUSTER_COUNTERS: [&str; 3] = ["total_jobs", "used_cpus", "total_cpus"];
/// 队列级计数器，向上汇总到集群和网格
pub const QUEUE_COUNTERS: [&str; 5] = [
    "running",
    "grid_running",
    "grid_queued",
    "local_queued",
    "prelrms_queued",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatsLevel {
    Grid,
    Cluster,
    Queue,
}

/// 某个组在统计窗口内的使用量
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupUsage {
    pub jobs: i64,
    pub wall_time: i64,
    pub cpu_time: i64,
}

/// 层级汇总记录，每次整体替换
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsRecord {
    pub name: String,
    pub level: StatsLevel,
    pub counters: BTreeMap<String, i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<BTreeMap<String, GroupUsage>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<StatsRecord>,
    pub computed_at: DateTime<Utc>,
}

impl StatsRecord {
    fn empty(name: &str, level: StatsLevel, computed_at: DateTime<Utc>) -> Self {
        let cluster_counters: &[&str] = match level {
            StatsLevel::Queue => &[],
            _ => &CLUSTER_COUNTERS,
        };
        let counters = cluster_counters
            .iter()
            .chain(QUEUE_COUNTERS.iter())
            .map(|name| (name.to_string(), 0))
            .collect();
        Self {
            name: name.to_string(),
            level,
            counters,
            usage: None,
            children: Vec::new(),
            computed_at,
        }
    }

    fn add_counters(&mut self, other: &BTreeMap<String, i64>) {
        for (name, value) in other {
            *self.counters.entry(name.clone()).or_insert(0) += value;
        }
    }

    pub fn counter(&self, name: &str) -> i64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    pub fn child(&self, name: &str) -> Option<&StatsRecord> {
        self.children.iter().find(|c| c.name == name)
    }

    /// 网格 → 集群 → 队列三级汇总，只统计活跃记录
    pub fn rollup(
        grid_name: &str,
        clusters: &[ClusterRecord],
        queues: &[QueueRecord],
        computed_at: DateTime<Utc>,
    ) -> Self {
        let mut grid = Self::empty(grid_name, StatsLevel::Grid, computed_at);

        let mut by_cluster: BTreeMap<&str, Vec<&QueueRecord>> = BTreeMap::new();
        for queue in queues.iter().filter(|q| q.is_active()) {
            by_cluster.entry(queue.hostname.as_str()).or_default().push(queue);
        }

        let mut active: Vec<&ClusterRecord> = clusters.iter().filter(|c| c.is_active()).collect();
        active.sort_by(|a, b| a.hostname.cmp(&b.hostname));

        for cluster in active {
            let mut node = Self::empty(&cluster.hostname, StatsLevel::Cluster, computed_at);
            node.counters.insert("total_jobs".to_string(), cluster.total_jobs);
            node.counters.insert("used_cpus".to_string(), cluster.used_cpus);
            node.counters.insert("total_cpus".to_string(), cluster.total_cpus);

            for queue in by_cluster.get(cluster.hostname.as_str()).into_iter().flatten() {
                let mut leaf = Self::empty(&queue.name, StatsLevel::Queue, computed_at);
                leaf.counters.insert("running".to_string(), queue.running);
                leaf.counters.insert("grid_running".to_string(), queue.grid_running);
                leaf.counters.insert("grid_queued".to_string(), queue.grid_queued);
                leaf.counters.insert("local_queued".to_string(), queue.local_queued);
                leaf.counters.insert("prelrms_queued".to_string(), queue.prelrms_queued);
                node.add_counters(&leaf.counters);
                node.children.push(leaf);
            }

            grid.add_counters(&node.counters);
            grid.children.push(node);
        }

        grid
    }
}
