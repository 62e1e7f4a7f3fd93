//! 作业生命周期判定
//!
//! 给定本地已知记录和本周期的观测结果，得出应写入的新记录。
//! 纯函数，不访问存储，便于对状态序列做性质测试。

use chrono::{DateTime, Utc};

use crate::models::job::{
    JobDetails, JobRecord, JobSnapshot, JobStatus, ObservedState, TerminalFamily,
};

/// 判定时使用的时间信息
#[derive(Debug, Clone, Copy)]
pub struct LifecycleClock {
    pub now: DateTime<Utc>,
    pub cycle_start: DateTime<Utc>,
    /// 本周期是否执行"已取回"检查
    pub fetched_check: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobDecision {
    Insert(JobRecord),
    Update { record: JobRecord, previous: JobStatus },
    /// 无需写入
    Unchanged,
    /// 首次出现即为 DELETED 的作业不入库
    Ignore,
}

impl JobDecision {
    pub fn record(&self) -> Option<&JobRecord> {
        match self {
            JobDecision::Insert(record) | JobDecision::Update { record, .. } => Some(record),
            JobDecision::Unchanged | JobDecision::Ignore => None,
        }
    }
}

/// 对一个作业做出判定
///
/// `observed == None` 表示该作业所在队列已被轮询，但作业在源端完全找不到。
pub fn decide(
    known: Option<&JobRecord>,
    observed: Option<&JobSnapshot>,
    clock: &LifecycleClock,
) -> JobDecision {
    match (known, observed) {
        (None, None) => JobDecision::Unchanged,
        (None, Some(snapshot)) => match snapshot.observed {
            ObservedState::Deleted => JobDecision::Ignore,
            ObservedState::Reported(status) => {
                JobDecision::Insert(JobRecord::from_snapshot(snapshot, status, clock.now))
            }
            ObservedState::Unrecognized => JobDecision::Insert(JobRecord::from_snapshot(
                snapshot,
                JobStatus::Submitted,
                clock.now,
            )),
        },
        (Some(record), _) if record.status.is_resolved() => JobDecision::Unchanged,
        (Some(record), Some(snapshot)) => observe_live(record, snapshot, clock),
        (Some(record), None) => observe_absent(record, clock),
    }
}

fn observe_live(record: &JobRecord, snapshot: &JobSnapshot, clock: &LifecycleClock) -> JobDecision {
    let details = snapshot.details.merged_over(&record.details);

    let status = match snapshot.observed {
        ObservedState::Deleted => resolve_deleted(record.status, &details, clock.now),
        ObservedState::Reported(reported) if record.status.is_terminal() => reported,
        ObservedState::Reported(reported) if record.status.can_transition(reported) => reported,
        ObservedState::Reported(_) | ObservedState::Unrecognized => record.status,
    };

    if status == record.status
        && details == record.details
        && snapshot.source_status == record.source_status
    {
        return JobDecision::Unchanged;
    }

    let mut updated = record.clone();
    updated.status = status;
    updated.source_status = snapshot.source_status.clone();
    updated.details = details;
    if record.status.is_rerun(status) {
        updated.rerun_count += 1;
    }
    if status == JobStatus::Lost && updated.details.completion_time.is_none() {
        updated.details.completion_time = Some(clock.now);
    }
    updated.last_modified = clock.now;

    JobDecision::Update {
        record: updated,
        previous: record.status,
    }
}

fn observe_absent(record: &JobRecord, clock: &LifecycleClock) -> JobDecision {
    let status = if record.status.is_active() {
        Some(JobStatus::Lost)
    } else {
        match (record.status.family(), record.details.session_erase_time) {
            (Some(family), Some(erase)) if erase <= clock.now => Some(family.fetched()),
            (Some(_), Some(_)) => None,
            (Some(family), None)
                if clock.fetched_check && record.last_modified <= clock.cycle_start =>
            {
                Some(family.fetched())
            }
            _ => None,
        }
    };

    match status {
        Some(status) => {
            let mut updated = record.clone();
            updated.status = status;
            if status == JobStatus::Lost && updated.details.completion_time.is_none() {
                updated.details.completion_time = Some(clock.now);
            }
            updated.last_modified = clock.now;
            JobDecision::Update {
                record: updated,
                previous: record.status,
            }
        }
        None => JobDecision::Unchanged,
    }
}

/// 源端报告 DELETED 时，按最后已知状态确定分支，再按会话目录清除时间区分取回/删除
fn resolve_deleted(
    current: JobStatus,
    details: &JobDetails,
    now: DateTime<Utc>,
) -> JobStatus {
    let family = match current.family() {
        Some(family) => family,
        None if current == JobStatus::Killing => TerminalFamily::Killed,
        None => match details.exit_code {
            Some(0) => TerminalFamily::Finished,
            Some(_) => TerminalFamily::Failed,
            None => return JobStatus::Lost,
        },
    };

    match details.session_erase_time {
        Some(erase) if erase > now => family.fetched(),
        _ => family.deleted(),
    }
}
