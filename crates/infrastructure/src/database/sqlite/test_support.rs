use chrono::{DateTime, Utc};
use infocache_core::models::{
    AttributeBag, ClusterRecord, JobDetails, JobRecord, JobStatus, QueueRecord, RecordStatus,
};
use sqlx::SqlitePool;

use crate::database::DatabaseManager;

pub(crate) async fn pool() -> SqlitePool {
    DatabaseManager::in_memory().await.unwrap().pool().clone()
}

pub(crate) fn cluster(hostname: &str, now: DateTime<Utc>) -> ClusterRecord {
    let mut attributes = AttributeBag::new();
    attributes.insert(
        "nordugrid-cluster-lrms-type".to_string(),
        vec!["SLURM".to_string()],
    );
    ClusterRecord {
        hostname: hostname.to_string(),
        alias: Some(format!("{hostname} alias")),
        endpoint_host: hostname.to_string(),
        endpoint_port: 2135,
        status: RecordStatus::Active,
        response_time: Some(0.25),
        processing_time: Some(0.5),
        blacklisted: false,
        total_cpus: 128,
        used_cpus: 64,
        total_jobs: 10,
        attributes,
        access_synced_at: None,
        last_modified: now,
    }
}

pub(crate) fn queue(hostname: &str, name: &str, now: DateTime<Utc>) -> QueueRecord {
    QueueRecord {
        hostname: hostname.to_string(),
        name: name.to_string(),
        status: RecordStatus::Active,
        running: 4,
        grid_running: 3,
        grid_queued: 2,
        local_queued: 1,
        prelrms_queued: 0,
        total_cpus: 32,
        attributes: AttributeBag::new(),
        last_modified: now,
    }
}

pub(crate) fn job(
    global_id: &str,
    hostname: &str,
    queue: &str,
    status: JobStatus,
    now: DateTime<Utc>,
) -> JobRecord {
    JobRecord {
        global_id: global_id.to_string(),
        status,
        source_status: status.as_str().to_string(),
        details: JobDetails {
            owner: Some("/O=Grid/CN=Alice".to_string()),
            cluster_name: hostname.to_string(),
            queue_name: queue.to_string(),
            ..JobDetails::default()
        },
        rerun_count: 0,
        last_modified: now,
    }
}
