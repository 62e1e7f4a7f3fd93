use std::time::Duration;

use chrono::Utc;
use infocache_core::config::DatabaseConfig;
use infocache_core::models::schema::{cluster_dn, CLUSTER_OBJECT_CLASS};
use infocache_core::models::{
    AttributeBag, ClusterChangeset, ClusterRecord, DirectoryRecord, EndpointId, QueueRecord,
    RecordStatus, SearchFilter,
};
use infocache_core::traits::{
    ClusterRepository, DirectoryClient, DirectoryFailure, DirectoryQuery, QueueRepository,
};
use infocache_infrastructure::{
    DatabaseManager, DirectoryFixture, FixtureEndpoint, FixtureFailure, InMemoryDirectory,
};

fn cluster(hostname: &str) -> ClusterRecord {
    ClusterRecord {
        hostname: hostname.to_string(),
        alias: None,
        endpoint_host: hostname.to_string(),
        endpoint_port: 2135,
        status: RecordStatus::Active,
        response_time: Some(0.1),
        processing_time: Some(0.3),
        blacklisted: false,
        total_cpus: 16,
        used_cpus: 4,
        total_jobs: 1,
        attributes: AttributeBag::new(),
        access_synced_at: None,
        last_modified: Utc::now(),
    }
}

fn queue(hostname: &str, name: &str) -> QueueRecord {
    QueueRecord {
        hostname: hostname.to_string(),
        name: name.to_string(),
        status: RecordStatus::Active,
        running: 1,
        grid_running: 1,
        grid_queued: 0,
        local_queued: 0,
        prelrms_queued: 0,
        total_cpus: 16,
        attributes: AttributeBag::new(),
        last_modified: Utc::now(),
    }
}

fn database_config(dir: &tempfile::TempDir) -> DatabaseConfig {
    DatabaseConfig {
        url: format!("sqlite://{}", dir.path().join("cache.db").display()),
        ..DatabaseConfig::default()
    }
}

#[tokio::test]
async fn test_records_survive_restart() {
    let dir = tempfile::tempdir().unwrap();

    let database = DatabaseManager::new(&database_config(&dir)).await.unwrap();
    database
        .cluster_repository()
        .apply_changeset(
            &ClusterChangeset::new(cluster("c1.example.org"))
                .with_queue(queue("c1.example.org", "batch")),
        )
        .await
        .unwrap();
    database.close().await;

    let reopened = DatabaseManager::new(&database_config(&dir)).await.unwrap();
    reopened.health_check().await.unwrap();
    let active = reopened.cluster_repository().list_active().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].hostname, "c1.example.org");
    let queues = reopened
        .queue_repository()
        .list_for_cluster("c1.example.org")
        .await
        .unwrap();
    assert_eq!(queues.len(), 1);
    reopened.close().await;
}

#[tokio::test]
async fn test_fixture_file_drives_directory_queries() {
    let fixture = DirectoryFixture {
        endpoints: vec![
            FixtureEndpoint {
                host: "C1.Example.org".to_string(),
                port: 2135,
                failure: None,
                delay_ms: 0,
                records: vec![DirectoryRecord::new(cluster_dn("c1.example.org"))
                    .with("objectClass", CLUSTER_OBJECT_CLASS)
                    .with("nordugrid-cluster-name", "c1.example.org")],
            },
            FixtureEndpoint {
                host: "down.example.org".to_string(),
                port: 2135,
                failure: Some(FixtureFailure::Unreachable),
                delay_ms: 0,
                records: vec![],
            },
        ],
    };
    let file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    std::fs::write(file.path(), serde_json::to_string_pretty(&fixture).unwrap()).unwrap();

    let directory = InMemoryDirectory::load(file.path()).await.unwrap();
    let query = DirectoryQuery::subtree(
        cluster_dn("c1.example.org"),
        SearchFilter::object_class(CLUSTER_OBJECT_CLASS),
    );

    let records = directory
        .query(&EndpointId::new("c1.example.org", 2135), &query, Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(records.len(), 1);

    let failure = directory
        .query(&EndpointId::new("down.example.org", 2135), &query, Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(failure, DirectoryFailure::Unreachable(_)));
}

#[tokio::test]
async fn test_malformed_fixture_is_configuration_error() {
    let file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    std::fs::write(file.path(), "{ not json").unwrap();

    let error = InMemoryDirectory::load(file.path()).await.unwrap_err();
    assert!(error.to_string().contains("目录夹具"));
}
