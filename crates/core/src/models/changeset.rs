use chrono::{DateTime, Utc};

use crate::models::cluster::ClusterRecord;
use crate::models::job::JobRecord;
use crate::models::queue::QueueRecord;

/// 一个集群在一个轮询周期内的全部写入，在同一事务中提交
#[derive(Debug, Clone)]
pub struct ClusterChangeset {
    pub cluster: ClusterRecord,
    pub queues: Vec<QueueRecord>,
    /// 本周期观测到的队列名，未列出的队列被置为不活跃
    pub present_queues: Vec<String>,
    pub job_writes: Vec<JobRecord>,
}

impl ClusterChangeset {
    pub fn new(cluster: ClusterRecord) -> Self {
        Self {
            cluster,
            queues: Vec::new(),
            present_queues: Vec::new(),
            job_writes: Vec::new(),
        }
    }

    pub fn hostname(&self) -> &str {
        &self.cluster.hostname
    }

    pub fn with_queue(mut self, queue: QueueRecord) -> Self {
        self.present_queues.push(queue.name.clone());
        self.queues.push(queue);
        self
    }
}

/// 变更集提交结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangesetSummary {
    /// 集群此前不存在或处于不活跃状态
    pub reactivated: bool,
    pub queues_written: u64,
    pub queues_deactivated: u64,
    pub jobs_written: u64,
    /// 因目标记录已解决而被拒绝的作业写入
    pub jobs_refused: u64,
}

/// 集群下线结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeactivationSummary {
    pub cluster_deactivated: bool,
    pub queues_deactivated: u64,
    pub access_entries_removed: u64,
}

/// 统计窗口内已完成作业的用量行
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedJobUsage {
    pub owner: Option<String>,
    pub used_wall_time: Option<i64>,
    pub used_cpu_time: Option<i64>,
    pub completion_time: Option<DateTime<Utc>>,
}
