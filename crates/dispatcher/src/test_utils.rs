use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use infocache_core::config::AppConfig;
use infocache_core::models::schema::{
    authuser_dn, cluster_dn, job_dn, queue_dn, AUTHUSER_OBJECT_CLASS, AUTHUSER_SN_ATTR,
    CLUSTER_OBJECT_CLASS, JOB_OBJECT_CLASS, QUEUE_OBJECT_CLASS, SERVICE_HOST_ATTR,
    SERVICE_PORT_ATTR, SERVICE_SUFFIX_ATTR,
};
use infocache_core::models::{
    AttributeBag, ClusterRecord, DirectoryRecord, Endpoint, EndpointId, JobSnapshot,
    QueueRecord, RecordStatus,
};
use infocache_infrastructure::{DatabaseManager, InMemoryDirectory, StaticPrincipalDirectory};

use crate::context::CacheContext;

pub const ROOT_BASE: &str = "Mds-Vo-name=NorduGrid,o=grid";

/// 内存数据库 + 内存目录服务的上下文
pub async fn test_context() -> (CacheContext, InMemoryDirectory) {
    test_context_with(test_config()).await
}

pub async fn test_context_with(config: AppConfig) -> (CacheContext, InMemoryDirectory) {
    let database = DatabaseManager::in_memory().await.unwrap();
    let directory = InMemoryDirectory::new();
    let principals = StaticPrincipalDirectory::from_config(&config.stats);
    let context = CacheContext::new(
        &database,
        Arc::new(directory.clone()),
        Arc::new(principals),
        config,
    );
    (context, directory)
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.directory.roots = vec!["index.example.org".to_string()];
    config.stats.groups = BTreeMap::from([(
        "atlas".to_string(),
        vec!["/O=Grid/CN=Alice".to_string()],
    )]);
    config
}

pub fn registry_entry(base: &str, host: &str, suffix: &str) -> DirectoryRecord {
    DirectoryRecord::new(format!("Mds-Host-hn={host},{base}"))
        .with(SERVICE_HOST_ATTR, host)
        .with(SERVICE_PORT_ATTR, "2135")
        .with(SERVICE_SUFFIX_ATTR, suffix)
}

pub fn resource(host: &str) -> Endpoint {
    Endpoint::resource(EndpointId::new(host, 2135), cluster_dn(host), None)
}

pub fn job_entry(host: &str, queue: &str, global_id: &str, status: &str) -> DirectoryRecord {
    DirectoryRecord::new(job_dn(host, queue, global_id))
        .with("objectClass", JOB_OBJECT_CLASS)
        .with("nordugrid-job-globalid", global_id)
        .with("nordugrid-job-status", status)
        .with("nordugrid-job-globalowner", "/O=Grid/CN=Alice")
        .with("nordugrid-job-execcluster", host)
        .with("nordugrid-job-execqueue", queue)
}

/// 在目录中发布一个集群及其队列和作业
pub async fn publish_cluster(
    directory: &InMemoryDirectory,
    host: &str,
    queues: &[(&str, Vec<(&str, &str)>)],
) {
    let endpoint = EndpointId::new(host, 2135);
    directory
        .upsert_record(
            &endpoint,
            DirectoryRecord::new(cluster_dn(host))
                .with("objectClass", CLUSTER_OBJECT_CLASS)
                .with("nordugrid-cluster-name", host)
                .with("nordugrid-cluster-totalcpus", "64")
                .with("nordugrid-cluster-usedcpus", "16")
                .with("nordugrid-cluster-totaljobs", "4"),
        )
        .await;

    for (queue, jobs) in queues {
        directory
            .upsert_record(
                &endpoint,
                DirectoryRecord::new(queue_dn(host, queue))
                    .with("objectClass", QUEUE_OBJECT_CLASS)
                    .with("nordugrid-queue-name", *queue)
                    .with("nordugrid-queue-running", "2")
                    .with("nordugrid-queue-gridqueued", "1"),
            )
            .await;
        for (id, status) in jobs {
            directory
                .upsert_record(&endpoint, job_entry(host, queue, id, status))
                .await;
        }
    }
}

pub async fn publish_users(directory: &InMemoryDirectory, host: &str, queue: &str, users: &[&str]) {
    let endpoint = EndpointId::new(host, 2135);
    for (index, user) in users.iter().enumerate() {
        directory
            .upsert_record(
                &endpoint,
                DirectoryRecord::new(authuser_dn(host, queue, index))
                    .with("objectClass", AUTHUSER_OBJECT_CLASS)
                    .with(AUTHUSER_SN_ATTR, *user),
            )
            .await;
    }
}

pub fn cluster_record(hostname: &str, at: DateTime<Utc>) -> ClusterRecord {
    ClusterRecord {
        hostname: hostname.to_string(),
        alias: None,
        endpoint_host: hostname.to_string(),
        endpoint_port: 2135,
        status: RecordStatus::Active,
        response_time: Some(0.1),
        processing_time: Some(0.2),
        blacklisted: false,
        total_cpus: 64,
        used_cpus: 16,
        total_jobs: 4,
        attributes: AttributeBag::new(),
        access_synced_at: None,
        last_modified: at,
    }
}

pub fn queue_record(hostname: &str, name: &str, at: DateTime<Utc>) -> QueueRecord {
    QueueRecord {
        hostname: hostname.to_string(),
        name: name.to_string(),
        status: RecordStatus::Active,
        running: 2,
        grid_running: 1,
        grid_queued: 1,
        local_queued: 0,
        prelrms_queued: 0,
        total_cpus: 16,
        attributes: AttributeBag::new(),
        last_modified: at,
    }
}

pub fn job_snapshot(host: &str, queue: &str, global_id: &str, status: &str) -> JobSnapshot {
    JobSnapshot::from_directory(&job_entry(host, queue, global_id, status), host, queue).unwrap()
}
