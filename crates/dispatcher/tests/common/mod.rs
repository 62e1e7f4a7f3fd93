#![allow(dead_code)]

use std::sync::Arc;

use infocache_core::config::AppConfig;
use infocache_core::models::schema::{
    authuser_dn, cluster_dn, job_dn, queue_dn, AUTHUSER_OBJECT_CLASS, AUTHUSER_SN_ATTR,
    CLUSTER_OBJECT_CLASS, JOB_OBJECT_CLASS, QUEUE_OBJECT_CLASS, SERVICE_HOST_ATTR,
    SERVICE_PORT_ATTR, SERVICE_SUFFIX_ATTR,
};
use infocache_core::models::{DirectoryRecord, EndpointId};
use infocache_dispatcher::CacheContext;
use infocache_infrastructure::{DatabaseManager, InMemoryDirectory, StaticPrincipalDirectory};

pub const INDEX_HOST: &str = "index.example.org";
pub const ROOT_BASE: &str = "Mds-Vo-name=NorduGrid,o=grid";

pub async fn setup(config: AppConfig) -> (CacheContext, InMemoryDirectory) {
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

pub fn config() -> AppConfig {
    let mut config = AppConfig::default();
    config.directory.roots = vec![INDEX_HOST.to_string()];
    config
}

pub fn endpoint(host: &str) -> EndpointId {
    EndpointId::new(host, 2135)
}

/// 根注册中心直接报告给定的集群
pub async fn publish_index(directory: &InMemoryDirectory, hosts: &[&str]) {
    let records = hosts
        .iter()
        .map(|host| registry_entry(ROOT_BASE, host, &cluster_dn(host)))
        .collect();
    directory.set_records(&endpoint(INDEX_HOST), records).await;
}

pub fn registry_entry(base: &str, host: &str, suffix: &str) -> DirectoryRecord {
    DirectoryRecord::new(format!("Mds-Host-hn={host},{base}"))
        .with(SERVICE_HOST_ATTR, host)
        .with(SERVICE_PORT_ATTR, "2135")
        .with(SERVICE_SUFFIX_ATTR, suffix)
}

pub fn job_entry(host: &str, queue: &str, global_id: &str, status: &str) -> DirectoryRecord {
    DirectoryRecord::new(job_dn(host, queue, global_id))
        .with("objectClass", JOB_OBJECT_CLASS)
        .with("nordugrid-job-globalid", global_id)
        .with("nordugrid-job-status", status)
        .with("nordugrid-job-globalowner", "/O=Grid/CN=Alice")
}

pub async fn publish_cluster(directory: &InMemoryDirectory, host: &str, queues: &[&str]) {
    let id = endpoint(host);
    directory
        .upsert_record(
            &id,
            DirectoryRecord::new(cluster_dn(host))
                .with("objectClass", CLUSTER_OBJECT_CLASS)
                .with("nordugrid-cluster-name", host)
                .with("nordugrid-cluster-totalcpus", "32")
                .with("nordugrid-cluster-usedcpus", "8"),
        )
        .await;
    for queue in queues {
        directory
            .upsert_record(
                &id,
                DirectoryRecord::new(queue_dn(host, queue))
                    .with("objectClass", QUEUE_OBJECT_CLASS)
                    .with("nordugrid-queue-name", *queue)
                    .with("nordugrid-queue-running", "3"),
            )
            .await;
    }
}

pub async fn publish_job(directory: &InMemoryDirectory, host: &str, job: DirectoryRecord) {
    directory.upsert_record(&endpoint(host), job).await;
}

pub async fn remove_job(directory: &InMemoryDirectory, host: &str, queue: &str, global_id: &str) {
    directory
        .remove_subtree(&endpoint(host), &job_dn(host, queue, global_id))
        .await;
}

pub async fn publish_users(directory: &InMemoryDirectory, host: &str, queue: &str, users: &[&str]) {
    for (index, user) in users.iter().enumerate() {
        directory
            .upsert_record(
                &endpoint(host),
                DirectoryRecord::new(authuser_dn(host, queue, index))
                    .with("objectClass", AUTHUSER_OBJECT_CLASS)
                    .with(AUTHUSER_SN_ATTR, *user),
            )
            .await;
    }
}
