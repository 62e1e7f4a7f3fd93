use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{CacheError, CacheResult};
use crate::models::directory::DirectoryRecord;
use crate::models::fields::{FieldValue, JobField, RecordField};

/// 作业状态
///
/// ```text
/// SUBMITTED → RUNNING → KILLING
///     └──────────┴─────────┴──→ FINISHED | FAILED | KILLED
///                                   ↓         ↓        ↓
///                       FIN_FETCHED|FIN_DELETED  FLD_*    KIL_*
/// 任意未解决状态 → LOST
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum JobStatus {
    #[serde(rename = "SUBMITTED")]
    Submitted,
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "KILLING")]
    Killing,
    #[serde(rename = "FINISHED")]
    Finished,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "KILLED")]
    Killed,
    #[serde(rename = "FIN_FETCHED")]
    FinFetched,
    #[serde(rename = "FIN_DELETED")]
    FinDeleted,
    #[serde(rename = "FLD_FETCHED")]
    FldFetched,
    #[serde(rename = "FLD_DELETED")]
    FldDeleted,
    #[serde(rename = "KIL_FETCHED")]
    KilFetched,
    #[serde(rename = "KIL_DELETED")]
    KilDeleted,
    #[serde(rename = "LOST")]
    Lost,
}

/// 已解决（不再跟踪）的状态，存储层拒绝覆盖这些记录
pub const RESOLVED_STATUSES: [JobStatus; 7] = [
    JobStatus::FinFetched,
    JobStatus::FinDeleted,
    JobStatus::FldFetched,
    JobStatus::FldDeleted,
    JobStatus::KilFetched,
    JobStatus::KilDeleted,
    JobStatus::Lost,
];

/// 终态所属的分支
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalFamily {
    Finished,
    Failed,
    Killed,
}

impl TerminalFamily {
    pub fn terminal(self) -> JobStatus {
        match self {
            TerminalFamily::Finished => JobStatus::Finished,
            TerminalFamily::Failed => JobStatus::Failed,
            TerminalFamily::Killed => JobStatus::Killed,
        }
    }

    pub fn fetched(self) -> JobStatus {
        match self {
            TerminalFamily::Finished => JobStatus::FinFetched,
            TerminalFamily::Failed => JobStatus::FldFetched,
            TerminalFamily::Killed => JobStatus::KilFetched,
        }
    }

    pub fn deleted(self) -> JobStatus {
        match self {
            TerminalFamily::Finished => JobStatus::FinDeleted,
            TerminalFamily::Failed => JobStatus::FldDeleted,
            TerminalFamily::Killed => JobStatus::KilDeleted,
        }
    }
}

impl JobStatus {
    pub const ALL: [JobStatus; 13] = [
        JobStatus::Submitted,
        JobStatus::Running,
        JobStatus::Killing,
        JobStatus::Finished,
        JobStatus::Failed,
        JobStatus::Killed,
        JobStatus::FinFetched,
        JobStatus::FinDeleted,
        JobStatus::FldFetched,
        JobStatus::FldDeleted,
        JobStatus::KilFetched,
        JobStatus::KilDeleted,
        JobStatus::Lost,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Submitted => "SUBMITTED",
            JobStatus::Running => "RUNNING",
            JobStatus::Killing => "KILLING",
            JobStatus::Finished => "FINISHED",
            JobStatus::Failed => "FAILED",
            JobStatus::Killed => "KILLED",
            JobStatus::FinFetched => "FIN_FETCHED",
            JobStatus::FinDeleted => "FIN_DELETED",
            JobStatus::FldFetched => "FLD_FETCHED",
            JobStatus::FldDeleted => "FLD_DELETED",
            JobStatus::KilFetched => "KIL_FETCHED",
            JobStatus::KilDeleted => "KIL_DELETED",
            JobStatus::Lost => "LOST",
        }
    }

    /// 解析存储形式的状态
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.as_str() == value)
    }

    /// 源端仍在处理中
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Submitted | JobStatus::Running | JobStatus::Killing)
    }

    /// 源端已报告结束，但尚未确认取回或删除
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Finished | JobStatus::Failed | JobStatus::Killed)
    }

    pub fn is_resolved(&self) -> bool {
        RESOLVED_STATUSES.contains(self)
    }

    pub fn family(&self) -> Option<TerminalFamily> {
        match self {
            JobStatus::Finished | JobStatus::FinFetched | JobStatus::FinDeleted => {
                Some(TerminalFamily::Finished)
            }
            JobStatus::Failed | JobStatus::FldFetched | JobStatus::FldDeleted => {
                Some(TerminalFamily::Failed)
            }
            JobStatus::Killed | JobStatus::KilFetched | JobStatus::KilDeleted => {
                Some(TerminalFamily::Killed)
            }
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            JobStatus::Submitted => 0,
            JobStatus::Running => 1,
            JobStatus::Killing => 2,
            JobStatus::Finished | JobStatus::Failed | JobStatus::Killed => 3,
            _ => 4,
        }
    }

    /// 生命周期图中是否存在 self → to 的边
    pub fn can_transition(&self, to: JobStatus) -> bool {
        if *self == to || self.is_resolved() {
            return false;
        }
        if self.is_terminal() {
            return to == JobStatus::Lost || (to.is_resolved() && to.family() == self.family());
        }
        to.rank() > self.rank()
    }

    /// 已结束的作业被源端以同一ID重新提交
    pub fn is_rerun(&self, to: JobStatus) -> bool {
        self.is_terminal() && *self != to && !to.is_resolved()
    }
}

impl sqlx::Type<sqlx::Sqlite> for JobStatus {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <&str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for JobStatus {
    fn decode(
        value: <sqlx::Sqlite as sqlx::Database>::ValueRef<'r>,
    ) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        JobStatus::parse(s).ok_or_else(|| format!("Invalid job status: {s}").into())
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for JobStatus {
    fn encode_by_ref(
        &self,
        buf: &mut <sqlx::Sqlite as sqlx::Database>::ArgumentBuffer<'q>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str(), buf)
    }
}

/// 源端报告的作业状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservedState {
    Reported(JobStatus),
    /// 源端显式报告 DELETED，只作为观测结果，从不存储
    Deleted,
    Unrecognized,
}

/// 源端状态前缀 → 观测状态，按顺序匹配
static SOURCE_STATUS_PREFIXES: &[(&str, ObservedState)] = &[
    ("DELETED", ObservedState::Deleted),
    ("ACCEPT", ObservedState::Reported(JobStatus::Submitted)),
    ("PREPAR", ObservedState::Reported(JobStatus::Submitted)),
    ("SUBMIT", ObservedState::Reported(JobStatus::Submitted)),
    ("INLRMS:Q", ObservedState::Reported(JobStatus::Submitted)),
    ("INLRMS", ObservedState::Reported(JobStatus::Running)),
    ("RUNNING", ObservedState::Reported(JobStatus::Running)),
    ("EXECUTED", ObservedState::Reported(JobStatus::Running)),
    ("FINISHING", ObservedState::Reported(JobStatus::Running)),
    ("KILLING", ObservedState::Reported(JobStatus::Killing)),
    ("CANCELING", ObservedState::Reported(JobStatus::Killing)),
    ("FINISHED", ObservedState::Reported(JobStatus::Finished)),
    ("FAILED", ObservedState::Reported(JobStatus::Failed)),
    ("KILLED", ObservedState::Reported(JobStatus::Killed)),
];

/// 将源端的状态字符串映射为生命周期状态
pub fn map_source_status(raw: &str) -> ObservedState {
    let normalized = raw.trim().to_ascii_uppercase();
    let normalized = normalized
        .strip_prefix("PENDING:")
        .unwrap_or(&normalized);

    SOURCE_STATUS_PREFIXES
        .iter()
        .find(|(prefix, _)| normalized.starts_with(prefix))
        .map(|(_, state)| *state)
        .unwrap_or(ObservedState::Unrecognized)
}

/// 作业的描述性字段，除状态以外的全部内容
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JobDetails {
    pub owner: Option<String>,
    pub job_name: Option<String>,
    pub cluster_name: String,
    pub queue_name: String,
    pub exit_code: Option<i64>,
    pub cpu_count: Option<i64>,
    pub submission_time: Option<DateTime<Utc>>,
    pub completion_time: Option<DateTime<Utc>>,
    pub session_erase_time: Option<DateTime<Utc>>,
    pub proxy_expiration_time: Option<DateTime<Utc>>,
    pub used_cpu_time: Option<i64>,
    pub used_wall_time: Option<i64>,
    pub req_cpu_time: Option<i64>,
    pub req_wall_time: Option<i64>,
    pub submission_ui: Option<String>,
}

impl JobDetails {
    /// 以新观测为准，缺失的字段沿用旧值
    pub fn merged_over(&self, previous: &JobDetails) -> JobDetails {
        JobDetails {
            owner: self.owner.clone().or_else(|| previous.owner.clone()),
            job_name: self.job_name.clone().or_else(|| previous.job_name.clone()),
            cluster_name: self.cluster_name.clone(),
            queue_name: self.queue_name.clone(),
            exit_code: self.exit_code.or(previous.exit_code),
            cpu_count: self.cpu_count.or(previous.cpu_count),
            submission_time: self.submission_time.or(previous.submission_time),
            completion_time: self.completion_time.or(previous.completion_time),
            session_erase_time: self.session_erase_time.or(previous.session_erase_time),
            proxy_expiration_time: self.proxy_expiration_time.or(previous.proxy_expiration_time),
            used_cpu_time: self.used_cpu_time.or(previous.used_cpu_time),
            used_wall_time: self.used_wall_time.or(previous.used_wall_time),
            req_cpu_time: self.req_cpu_time.or(previous.req_cpu_time),
            req_wall_time: self.req_wall_time.or(previous.req_wall_time),
            submission_ui: self.submission_ui.clone().or_else(|| previous.submission_ui.clone()),
        }
    }
}

/// 一次轮询中观测到的作业
#[derive(Debug, Clone, PartialEq)]
pub struct JobSnapshot {
    pub global_id: String,
    pub source_status: String,
    pub observed: ObservedState,
    pub details: JobDetails,
}

impl JobSnapshot {
    /// 从目录中的作业对象解析，集群和队列以实际轮询的位置为准
    pub fn from_directory(
        record: &DirectoryRecord,
        hostname: &str,
        queue: &str,
    ) -> CacheResult<Self> {
        let global_id = record
            .first(JobField::GlobalId.attribute())
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| CacheError::Schema(format!("作业对象缺少全局ID: {}", record.dn)))?
            .to_string();

        let source_status = record
            .first(JobField::Status.attribute())
            .unwrap_or_default()
            .trim()
            .to_string();

        let value = |field: JobField| field.kind().parse(record.values(field.attribute()));
        let text = |field: JobField| value(field).and_then(|v| v.as_text().map(str::to_string));
        let integer = |field: JobField| value(field).and_then(|v| v.as_i64());
        let time = |field: JobField| value(field).and_then(|v| v.as_time());

        Ok(Self {
            observed: map_source_status(&source_status),
            source_status,
            details: JobDetails {
                owner: text(JobField::GlobalOwner),
                job_name: text(JobField::JobName),
                cluster_name: hostname.to_string(),
                queue_name: queue.to_string(),
                exit_code: integer(JobField::ExitCode),
                cpu_count: integer(JobField::CpuCount),
                submission_time: time(JobField::SubmissionTime),
                completion_time: time(JobField::CompletionTime),
                session_erase_time: time(JobField::SessionDirEraseTime),
                proxy_expiration_time: time(JobField::ProxyExpirationTime),
                used_cpu_time: integer(JobField::UsedCpuTime),
                used_wall_time: integer(JobField::UsedWallTime),
                req_cpu_time: integer(JobField::ReqCpuTime),
                req_wall_time: integer(JobField::ReqWallTime),
                submission_ui: text(JobField::SubmissionUi),
            },
            global_id,
        })
    }
}

/// 作业记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub global_id: String,
    pub status: JobStatus,
    /// 源端最近一次报告的原始状态
    pub source_status: String,
    #[serde(flatten)]
    pub details: JobDetails,
    /// 被重新提交（终态后又出现其他状态）的次数
    pub rerun_count: i64,
    pub last_modified: DateTime<Utc>,
}

impl JobRecord {
    pub fn from_snapshot(snapshot: &JobSnapshot, status: JobStatus, now: DateTime<Utc>) -> Self {
        Self {
            global_id: snapshot.global_id.clone(),
            status,
            source_status: snapshot.source_status.clone(),
            details: snapshot.details.clone(),
            rerun_count: 0,
            last_modified: now,
        }
    }

    /// 按字段取值
    pub fn get(&self, field: JobField) -> Option<FieldValue> {
        let d = &self.details;
        match field {
            JobField::GlobalId => Some(FieldValue::Text(self.global_id.clone())),
            JobField::Status => Some(FieldValue::Text(self.status.as_str().to_string())),
            JobField::GlobalOwner => d.owner.clone().map(FieldValue::Text),
            JobField::JobName => d.job_name.clone().map(FieldValue::Text),
            JobField::ExecCluster => Some(FieldValue::Text(d.cluster_name.clone())),
            JobField::ExecQueue => Some(FieldValue::Text(d.queue_name.clone())),
            JobField::ExitCode => d.exit_code.map(FieldValue::Integer),
            JobField::CpuCount => d.cpu_count.map(FieldValue::Integer),
            JobField::SubmissionTime => d.submission_time.map(FieldValue::Time),
            JobField::CompletionTime => d.completion_time.map(FieldValue::Time),
            JobField::SessionDirEraseTime => d.session_erase_time.map(FieldValue::Time),
            JobField::ProxyExpirationTime => d.proxy_expiration_time.map(FieldValue::Time),
            JobField::UsedCpuTime => d.used_cpu_time.map(FieldValue::Integer),
            JobField::UsedWallTime => d.used_wall_time.map(FieldValue::Integer),
            JobField::ReqCpuTime => d.req_cpu_time.map(FieldValue::Integer),
            JobField::ReqWallTime => d.req_wall_time.map(FieldValue::Integer),
            JobField::SubmissionUi => d.submission_ui.clone().map(FieldValue::Text),
            JobField::ClientSoftware
            | JobField::ExecutionNodes
            | JobField::Stderr
            | JobField::Stdout => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::schema::job_dn;

    #[test]
    fn test_source_status_mapping() {
        assert_eq!(map_source_status("ACCEPTED"), ObservedState::Reported(JobStatus::Submitted));
        assert_eq!(map_source_status("INLRMS:Q"), ObservedState::Reported(JobStatus::Submitted));
        assert_eq!(map_source_status("INLRMS: R"), ObservedState::Reported(JobStatus::Running));
        assert_eq!(map_source_status("PENDING:INLRMS"), ObservedState::Reported(JobStatus::Running));
        assert_eq!(map_source_status("FINISHING"), ObservedState::Reported(JobStatus::Running));
        assert_eq!(map_source_status("FINISHED"), ObservedState::Reported(JobStatus::Finished));
        assert_eq!(map_source_status("KILLING"), ObservedState::Reported(JobStatus::Killing));
        assert_eq!(map_source_status("deleted"), ObservedState::Deleted);
        assert_eq!(map_source_status("WEIRD"), ObservedState::Unrecognized);
    }

    #[test]
    fn test_lifecycle_edges() {
        assert!(JobStatus::Submitted.can_transition(JobStatus::Running));
        assert!(JobStatus::Running.can_transition(JobStatus::Finished));
        assert!(JobStatus::Killing.can_transition(JobStatus::Killed));
        assert!(!JobStatus::Running.can_transition(JobStatus::Submitted));
        assert!(JobStatus::Finished.can_transition(JobStatus::FinFetched));
        assert!(!JobStatus::Finished.can_transition(JobStatus::FldDeleted));
        assert!(JobStatus::Failed.can_transition(JobStatus::Lost));
        assert!(!JobStatus::Lost.can_transition(JobStatus::Running));
        assert!(!JobStatus::FinFetched.can_transition(JobStatus::FinDeleted));
    }

    #[test]
    fn test_rerun_detection() {
        assert!(JobStatus::Finished.is_rerun(JobStatus::Running));
        assert!(JobStatus::Failed.is_rerun(JobStatus::Finished));
        assert!(!JobStatus::Finished.is_rerun(JobStatus::Finished));
        assert!(!JobStatus::Running.is_rerun(JobStatus::Submitted));
        assert!(!JobStatus::Finished.is_rerun(JobStatus::FinFetched));
    }

    #[test]
    fn test_status_storage_form() {
        for status in JobStatus::ALL {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(JobStatus::parse("DELETED"), None);
    }

    #[test]
    fn test_snapshot_from_directory() {
        let record = DirectoryRecord::new(job_dn("c1", "batch", "gsiftp://c1/jobs/1"))
            .with("nordugrid-job-globalid", "gsiftp://c1/jobs/1")
            .with("nordugrid-job-globalowner", "/O=Grid/CN=Alice")
            .with("nordugrid-job-status", "INLRMS:R")
            .with("nordugrid-job-exitcode", "0")
            .with("nordugrid-job-sessiondirerasetime", "20300101000000Z")
            .with("nordugrid-job-execcluster", "elsewhere");

        let snapshot = JobSnapshot::from_directory(&record, "c1", "batch").unwrap();
        assert_eq!(snapshot.observed, ObservedState::Reported(JobStatus::Running));
        assert_eq!(snapshot.details.cluster_name, "c1");
        assert_eq!(snapshot.details.exit_code, Some(0));
        assert!(snapshot.details.session_erase_time.is_some());

        let job = JobRecord::from_snapshot(&snapshot, JobStatus::Running, Utc::now());
        assert_eq!(
            job.get(JobField::GlobalOwner),
            Some(FieldValue::Text("/O=Grid/CN=Alice".to_string()))
        );
        assert_eq!(job.get(JobField::Status), Some(FieldValue::Text("RUNNING".to_string())));
    }

    #[test]
    fn test_snapshot_requires_global_id() {
        let record = DirectoryRecord::new("nordugrid-job-globalid=,o=grid")
            .with("nordugrid-job-status", "FINISHED");
        assert!(JobSnapshot::from_directory(&record, "c1", "batch").is_err());
    }

    #[test]
    fn test_details_merge_keeps_previous_values() {
        let previous = JobDetails {
            exit_code: Some(1),
            owner: Some("bob".to_string()),
            ..JobDetails::default()
        };
        let current = JobDetails {
            owner: Some("alice".to_string()),
            ..JobDetails::default()
        };
        let merged = current.merged_over(&previous);
        assert_eq!(merged.exit_code, Some(1));
        assert_eq!(merged.owner.as_deref(), Some("alice"));
    }
}
