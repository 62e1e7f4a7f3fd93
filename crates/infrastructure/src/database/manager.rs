use anyhow::{Context, Result};
use infocache_core::config::models::DatabaseConfig;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use infocache_core::traits::{
    AccessRepository, ClusterRepository, JobRepository, QueueRepository, RegistryRepository,
    StatsRepository,
};

use super::sqlite::{
    SqliteAccessRepository, SqliteClusterRepository, SqliteJobRepository, SqliteQueueRepository,
    SqliteRegistryRepository, SqliteStatsRepository,
};

pub type DbPool = Pool<Sqlite>;

/// 建表语句，按依赖顺序执行
const SCHEMA: &[(&str, &str)] = &[
    (
        "集群表",
        r#"
        CREATE TABLE IF NOT EXISTS clusters (
            hostname TEXT PRIMARY KEY,
            alias TEXT,
            endpoint_host TEXT NOT NULL,
            endpoint_port INTEGER NOT NULL,
            status TEXT NOT NULL,
            response_time REAL,
            processing_time REAL,
            blacklisted INTEGER NOT NULL DEFAULT 0,
            total_cpus INTEGER NOT NULL DEFAULT 0,
            used_cpus INTEGER NOT NULL DEFAULT 0,
            total_jobs INTEGER NOT NULL DEFAULT 0,
            attributes TEXT NOT NULL DEFAULT '{}',
            access_synced_at DATETIME,
            last_modified DATETIME NOT NULL
        )
        "#,
    ),
    (
        "队列表",
        r#"
        CREATE TABLE IF NOT EXISTS queues (
            hostname TEXT NOT NULL,
            name TEXT NOT NULL,
            status TEXT NOT NULL,
            running INTEGER NOT NULL DEFAULT 0,
            grid_running INTEGER NOT NULL DEFAULT 0,
            grid_queued INTEGER NOT NULL DEFAULT 0,
            local_queued INTEGER NOT NULL DEFAULT 0,
            prelrms_queued INTEGER NOT NULL DEFAULT 0,
            total_cpus INTEGER NOT NULL DEFAULT 0,
            attributes TEXT NOT NULL DEFAULT '{}',
            last_modified DATETIME NOT NULL,
            PRIMARY KEY (hostname, name),
            FOREIGN KEY (hostname) REFERENCES clusters (hostname) ON DELETE CASCADE
        )
        "#,
    ),
    (
        "作业表",
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            global_id TEXT PRIMARY KEY,
            status TEXT NOT NULL,
            source_status TEXT NOT NULL DEFAULT '',
            owner TEXT,
            job_name TEXT,
            cluster_name TEXT NOT NULL,
            queue_name TEXT NOT NULL,
            exit_code INTEGER,
            cpu_count INTEGER,
            submission_time DATETIME,
            completion_time DATETIME,
            session_erase_time DATETIME,
            proxy_expiration_time DATETIME,
            used_cpu_time INTEGER,
            used_wall_time INTEGER,
            req_cpu_time INTEGER,
            req_wall_time INTEGER,
            submission_ui TEXT,
            rerun_count INTEGER NOT NULL DEFAULT 0,
            last_modified DATETIME NOT NULL
        )
        "#,
    ),
    (
        "授权表",
        r#"
        CREATE TABLE IF NOT EXISTS access_entries (
            hostname TEXT NOT NULL,
            queue_name TEXT NOT NULL,
            principal TEXT NOT NULL,
            last_modified DATETIME NOT NULL,
            PRIMARY KEY (hostname, queue_name, principal),
            FOREIGN KEY (hostname, queue_name) REFERENCES queues (hostname, name) ON DELETE CASCADE
        )
        "#,
    ),
    (
        "统计表",
        r#"
        CREATE TABLE IF NOT EXISTS stats (
            name TEXT PRIMARY KEY,
            payload TEXT NOT NULL,
            computed_at DATETIME NOT NULL
        )
        "#,
    ),
    (
        "注册中心表",
        r#"
        CREATE TABLE IF NOT EXISTS registries (
            hostname TEXT NOT NULL,
            port INTEGER NOT NULL,
            base TEXT NOT NULL,
            status TEXT NOT NULL,
            response_time REAL,
            processing_time REAL,
            blacklisted INTEGER NOT NULL DEFAULT 0,
            last_modified DATETIME NOT NULL,
            PRIMARY KEY (hostname, port)
        )
        "#,
    ),
    (
        "集群状态索引",
        "CREATE INDEX IF NOT EXISTS idx_clusters_status ON clusters(status, last_modified)",
    ),
    (
        "作业集群索引",
        "CREATE INDEX IF NOT EXISTS idx_jobs_cluster ON jobs(cluster_name, status)",
    ),
    (
        "作业状态索引",
        "CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status, last_modified)",
    ),
];

/// SQLite 连接池和仓储工厂
pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!("创建SQLite数据库连接池: {}", config.url);

        let connect_options = SqliteConnectOptions::from_str(&config.url)
            .context("解析数据库URL失败")?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(config.busy_timeout())
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connection_timeout())
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
            .max_lifetime(Duration::from_secs(1800))
            .connect_with(connect_options)
            .await
            .context("创建数据库连接池失败")?;

        let manager = Self { pool };
        manager.migrate().await?;
        Ok(manager)
    }

    /// 单连接的内存数据库，连接关闭即丢弃全部数据
    pub async fn in_memory() -> Result<Self> {
        let connect_options = SqliteConnectOptions::from_str("sqlite::memory:")
            .context("解析数据库URL失败")?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(connect_options)
            .await
            .context("创建内存数据库失败")?;

        let manager = Self { pool };
        manager.migrate().await?;
        Ok(manager)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// 创建缺失的表和索引
    pub async fn migrate(&self) -> Result<()> {
        for (name, statement) in SCHEMA.iter().copied() {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .with_context(|| format!("创建{name}失败"))?;
        }
        info!("✅ 数据库表结构就绪");
        Ok(())
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub fn cluster_repository(&self) -> Arc<dyn ClusterRepository> {
        Arc::new(SqliteClusterRepository::new(self.pool.clone()))
    }

    pub fn queue_repository(&self) -> Arc<dyn QueueRepository> {
        Arc::new(SqliteQueueRepository::new(self.pool.clone()))
    }

    pub fn job_repository(&self) -> Arc<dyn JobRepository> {
        Arc::new(SqliteJobRepository::new(self.pool.clone()))
    }

    pub fn access_repository(&self) -> Arc<dyn AccessRepository> {
        Arc::new(SqliteAccessRepository::new(self.pool.clone()))
    }

    pub fn stats_repository(&self) -> Arc<dyn StatsRepository> {
        Arc::new(SqliteStatsRepository::new(self.pool.clone()))
    }

    pub fn registry_repository(&self) -> Arc<dyn RegistryRepository> {
        Arc::new(SqliteRegistryRepository::new(self.pool.clone()))
    }
}
