use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 队列授权条目：(集群, 队列, 主体)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessEntry {
    pub hostname: String,
    pub queue_name: String,
    pub principal: String,
    pub last_modified: DateTime<Utc>,
}

/// 一次替换的差异
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessDiff {
    pub added: u64,
    pub removed: u64,
}

impl AccessDiff {
    pub fn merge(&mut self, other: AccessDiff) {
        self.added += other.added;
        self.removed += other.removed;
    }

    pub fn is_empty(&self) -> bool {
        self.added == 0 && self.removed == 0
    }
}
