//! 静态属性注册表
//!
//! 目录中的属性名映射到固定的字段枚举，启动时构建一次查找表；
//! 记录通过 `get(field)` 取得带类型的值。

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

/// 目录时间格式（UTC）
pub const DIRECTORY_TIME_FORMAT: &str = "%Y%m%d%H%M%SZ";

/// 解析目录中的时间字符串
pub fn parse_directory_time(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value.trim(), DIRECTORY_TIME_FORMAT)
        .ok()
        .map(|t| t.and_utc())
}

pub fn format_directory_time(time: DateTime<Utc>) -> String {
    time.format(DIRECTORY_TIME_FORMAT).to_string()
}

/// 字段值
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Time(DateTime<Utc>),
    List(Vec<String>),
}

impl FieldValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<DateTime<Utc>> {
        match self {
            FieldValue::Time(v) => Some(*v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Float,
    Time,
    List,
}

impl FieldKind {
    /// 按字段类型解析原始属性值，无法解析时返回 None
    pub fn parse(self, values: &[String]) -> Option<FieldValue> {
        let first = values.first().map(|v| v.trim());
        match self {
            FieldKind::Text => first.map(|v| FieldValue::Text(v.to_string())),
            FieldKind::Integer => first.and_then(|v| v.parse().ok()).map(FieldValue::Integer),
            FieldKind::Float => first.and_then(|v| v.parse().ok()).map(FieldValue::Float),
            FieldKind::Time => first.and_then(parse_directory_time).map(FieldValue::Time),
            FieldKind::List if values.is_empty() => None,
            FieldKind::List => Some(FieldValue::List(values.to_vec())),
        }
    }
}

/// 目录属性到字段的映射
pub trait RecordField: Copy + Eq + std::hash::Hash + Send + Sync + 'static {
    const ALL: &'static [Self];

    /// 目录中的属性名（小写）
    fn attribute(self) -> &'static str;

    fn kind(self) -> FieldKind;

    fn lookup(attribute: &str) -> Option<Self>;
}

fn build_index<F: RecordField>() -> HashMap<&'static str, F> {
    F::ALL.iter().map(|f| (f.attribute(), *f)).collect()
}

/// 从记录中挑出注册表里认识的属性
pub fn collect_known<F: RecordField>(
    attributes: &BTreeMap<String, Vec<String>>,
) -> BTreeMap<String, Vec<String>> {
    attributes
        .iter()
        .filter(|(name, _)| F::lookup(name).is_some())
        .map(|(name, values)| (name.clone(), values.clone()))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClusterField {
    Name,
    Alias,
    Location,
    Support,
    IssuerCa,
    Middleware,
    RuntimeEnvironment,
    TotalJobs,
    TotalCpus,
    UsedCpus,
    Benchmark,
    Homogeneity,
    NodeCpu,
    OpSys,
}

static CLUSTER_FIELDS: LazyLock<HashMap<&'static str, ClusterField>> =
    LazyLock::new(build_index::<ClusterField>);

impl RecordField for ClusterField {
    const ALL: &'static [Self] = &[
        ClusterField::Name,
        ClusterField::Alias,
        ClusterField::Location,
        ClusterField::Support,
        ClusterField::IssuerCa,
        ClusterField::Middleware,
        ClusterField::RuntimeEnvironment,
        ClusterField::TotalJobs,
        ClusterField::TotalCpus,
        ClusterField::UsedCpus,
        ClusterField::Benchmark,
        ClusterField::Homogeneity,
        ClusterField::NodeCpu,
        ClusterField::OpSys,
    ];

    fn attribute(self) -> &'static str {
        match self {
            ClusterField::Name => "nordugrid-cluster-name",
            ClusterField::Alias => "nordugrid-cluster-aliasname",
            ClusterField::Location => "nordugrid-cluster-location",
            ClusterField::Support => "nordugrid-cluster-support",
            ClusterField::IssuerCa => "nordugrid-cluster-issuerca",
            ClusterField::Middleware => "nordugrid-cluster-middleware",
            ClusterField::RuntimeEnvironment => "nordugrid-cluster-runtimeenvironment",
            ClusterField::TotalJobs => "nordugrid-cluster-totaljobs",
            ClusterField::TotalCpus => "nordugrid-cluster-totalcpus",
            ClusterField::UsedCpus => "nordugrid-cluster-usedcpus",
            ClusterField::Benchmark => "nordugrid-cluster-benchmark",
            ClusterField::Homogeneity => "nordugrid-cluster-homogeneity",
            ClusterField::NodeCpu => "nordugrid-cluster-nodecpu",
            ClusterField::OpSys => "nordugrid-cluster-opsys",
        }
    }

    fn kind(self) -> FieldKind {
        match self {
            ClusterField::TotalJobs | ClusterField::TotalCpus | ClusterField::UsedCpus => {
                FieldKind::Integer
            }
            ClusterField::Support
            | ClusterField::Middleware
            | ClusterField::RuntimeEnvironment
            | ClusterField::Benchmark
            | ClusterField::OpSys => FieldKind::List,
            _ => FieldKind::Text,
        }
    }

    fn lookup(attribute: &str) -> Option<Self> {
        CLUSTER_FIELDS.get(attribute.to_ascii_lowercase().as_str()).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueField {
    Name,
    Status,
    Running,
    GridRunning,
    PrelrmsQueued,
    LocalQueued,
    GridQueued,
    TotalCpus,
    NodeMemory,
    NodeCpu,
    MaxCpuTime,
    MaxWallTime,
    Benchmark,
}

static QUEUE_FIELDS: LazyLock<HashMap<&'static str, QueueField>> =
    LazyLock::new(build_index::<QueueField>);

impl RecordField for QueueField {
    const ALL: &'static [Self] = &[
        QueueField::Name,
        QueueField::Status,
        QueueField::Running,
        QueueField::GridRunning,
        QueueField::PrelrmsQueued,
        QueueField::LocalQueued,
        QueueField::GridQueued,
        QueueField::TotalCpus,
        QueueField::NodeMemory,
        QueueField::NodeCpu,
        QueueField::MaxCpuTime,
        QueueField::MaxWallTime,
        QueueField::Benchmark,
    ];

    fn attribute(self) -> &'static str {
        match self {
            QueueField::Name => "nordugrid-queue-name",
            QueueField::Status => "nordugrid-queue-status",
            QueueField::Running => "nordugrid-queue-running",
            QueueField::GridRunning => "nordugrid-queue-gridrunning",
            QueueField::PrelrmsQueued => "nordugrid-queue-prelrmsqueued",
            QueueField::LocalQueued => "nordugrid-queue-localqueued",
            QueueField::GridQueued => "nordugrid-queue-gridqueued",
            QueueField::TotalCpus => "nordugrid-queue-totalcpus",
            QueueField::NodeMemory => "nordugrid-queue-nodememory",
            QueueField::NodeCpu => "nordugrid-queue-nodecpu",
            QueueField::MaxCpuTime => "nordugrid-queue-maxcputime",
            QueueField::MaxWallTime => "nordugrid-queue-maxwalltime",
            QueueField::Benchmark => "nordugrid-queue-benchmark",
        }
    }

    fn kind(self) -> FieldKind {
        match self {
            QueueField::Name | QueueField::Status | QueueField::NodeCpu => FieldKind::Text,
            QueueField::Benchmark => FieldKind::List,
            _ => FieldKind::Integer,
        }
    }

    fn lookup(attribute: &str) -> Option<Self> {
        QUEUE_FIELDS.get(attribute.to_ascii_lowercase().as_str()).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobField {
    JobName,
    GlobalId,
    GlobalOwner,
    Status,
    ClientSoftware,
    CpuCount,
    ExecutionNodes,
    SubmissionTime,
    CompletionTime,
    ExitCode,
    ProxyExpirationTime,
    ReqCpuTime,
    ReqWallTime,
    SessionDirEraseTime,
    Stderr,
    Stdout,
    UsedCpuTime,
    ExecCluster,
    ExecQueue,
    UsedWallTime,
    SubmissionUi,
}

static JOB_FIELDS: LazyLock<HashMap<&'static str, JobField>> =
    LazyLock::new(build_index::<JobField>);

impl RecordField for JobField {
    const ALL: &'static [Self] = &[
        JobField::JobName,
        JobField::GlobalId,
        JobField::GlobalOwner,
        JobField::Status,
        JobField::ClientSoftware,
        JobField::CpuCount,
        JobField::ExecutionNodes,
        JobField::SubmissionTime,
        JobField::CompletionTime,
        JobField::ExitCode,
        JobField::ProxyExpirationTime,
        JobField::ReqCpuTime,
        JobField::ReqWallTime,
        JobField::SessionDirEraseTime,
        JobField::Stderr,
        JobField::Stdout,
        JobField::UsedCpuTime,
        JobField::ExecCluster,
        JobField::ExecQueue,
        JobField::UsedWallTime,
        JobField::SubmissionUi,
    ];

    fn attribute(self) -> &'static str {
        match self {
            JobField::JobName => "nordugrid-job-jobname",
            JobField::GlobalId => "nordugrid-job-globalid",
            JobField::GlobalOwner => "nordugrid-job-globalowner",
            JobField::Status => "nordugrid-job-status",
            JobField::ClientSoftware => "nordugrid-job-clientsoftware",
            JobField::CpuCount => "nordugrid-job-cpucount",
            JobField::ExecutionNodes => "nordugrid-job-executionnodes",
            JobField::SubmissionTime => "nordugrid-job-submissiontime",
            JobField::CompletionTime => "nordugrid-job-completiontime",
            JobField::ExitCode => "nordugrid-job-exitcode",
            JobField::ProxyExpirationTime => "nordugrid-job-proxyexpirationtime",
            JobField::ReqCpuTime => "nordugrid-job-reqcputime",
            JobField::ReqWallTime => "nordugrid-job-reqwalltime",
            JobField::SessionDirEraseTime => "nordugrid-job-sessiondirerasetime",
            JobField::Stderr => "nordugrid-job-stderr",
            JobField::Stdout => "nordugrid-job-stdout",
            JobField::UsedCpuTime => "nordugrid-job-usedcputime",
            JobField::ExecCluster => "nordugrid-job-execcluster",
            JobField::ExecQueue => "nordugrid-job-execqueue",
            JobField::UsedWallTime => "nordugrid-job-usedwalltime",
            JobField::SubmissionUi => "nordugrid-job-submissionui",
        }
    }

    fn kind(self) -> FieldKind {
        match self {
            JobField::CpuCount
            | JobField::ExitCode
            | JobField::ReqCpuTime
            | JobField::ReqWallTime
            | JobField::UsedCpuTime
            | JobField::UsedWallTime => FieldKind::Integer,
            JobField::SubmissionTime
            | JobField::CompletionTime
            | JobField::ProxyExpirationTime
            | JobField::SessionDirEraseTime => FieldKind::Time,
            JobField::ExecutionNodes => FieldKind::List,
            _ => FieldKind::Text,
        }
    }

    fn lookup(attribute: &str) -> Option<Self> {
        JOB_FIELDS.get(attribute.to_ascii_lowercase().as_str()).copied()
    }
}

/// 某一类字段的全部属性名，用于构造查询的属性列表
pub fn attribute_names<F: RecordField>() -> Vec<String> {
    F::ALL.iter().map(|f| f.attribute().to_string()).collect()
}
