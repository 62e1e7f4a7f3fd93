use std::sync::Arc;

use anyhow::{Context, Result};
use infocache_core::config::AppConfig;
use infocache_core::traits::DirectoryClient;
use infocache_dispatcher::{AccessSynchronizer, CacheContext, CacheController, Housekeeper};
use infocache_infrastructure::{DatabaseManager, InMemoryDirectory, StaticPrincipalDirectory};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// 主应用程序：组装存储、目录客户端和三个循环
pub struct Application {
    database: DatabaseManager,
    controller: Arc<CacheController>,
    access_sync: Option<Arc<AccessSynchronizer>>,
    housekeeper: Arc<Housekeeper>,
}

impl Application {
    /// 创建应用实例，任何启动错误都在进入轮询循环之前返回
    pub async fn new(config: AppConfig) -> Result<Self> {
        let roots = config
            .directory
            .root_endpoints()
            .context("根注册中心配置无效")?;
        info!("根注册中心: {:?}", roots);

        let database = DatabaseManager::new(&config.database)
            .await
            .context("初始化数据库失败")?;
        database.health_check().await.context("数据库健康检查失败")?;

        let directory = create_directory_client(&config).await?;
        let principals = Arc::new(StaticPrincipalDirectory::from_config(&config.stats));
        let access_sync_enabled = config.access_sync.enabled;

        let context = CacheContext::new(&database, directory, principals, config);
        let controller = Arc::new(CacheController::new(context.clone()));
        let access_sync = access_sync_enabled.then(|| Arc::new(AccessSynchronizer::new(context.clone())));
        let housekeeper = Arc::new(Housekeeper::new(context));

        Ok(Self {
            database,
            controller,
            access_sync,
            housekeeper,
        })
    }

    /// 运行全部循环，直到收到关闭信号
    pub async fn run(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let mut handles = Vec::new();

        let controller = Arc::clone(&self.controller);
        let rx = shutdown_rx.resubscribe();
        handles.push(("轮询循环", tokio::spawn(async move { controller.run(rx).await })));

        if let Some(access_sync) = &self.access_sync {
            let access_sync = Arc::clone(access_sync);
            let rx = shutdown_rx.resubscribe();
            handles.push(("授权同步循环", tokio::spawn(async move { access_sync.run(rx).await })));
        } else {
            info!("授权列表同步已禁用");
        }

        let housekeeper = Arc::clone(&self.housekeeper);
        let rx = shutdown_rx.resubscribe();
        handles.push(("清理循环", tokio::spawn(async move { housekeeper.run(rx).await })));

        for (name, handle) in handles {
            if let Err(e) = handle.await {
                error!("{name}异常退出: {e}");
            }
        }

        info!("所有循环已停止，共完成 {} 个轮询周期", self.controller.completed_cycles());
        Ok(())
    }

    pub async fn close(&self) {
        self.database.close().await;
    }
}

/// 目录客户端：配置了夹具文件时从文件加载，否则使用空的内存目录
async fn create_directory_client(config: &AppConfig) -> Result<Arc<dyn DirectoryClient>> {
    let directory = match &config.directory.fixture_path {
        Some(path) => InMemoryDirectory::load(path)
            .await
            .with_context(|| format!("加载目录夹具失败: {path}"))?,
        None => {
            warn!("未配置目录夹具，使用空的内存目录，所有端点都将不可达");
            InMemoryDirectory::new()
        }
    };
    Ok(Arc::new(directory))
}
