use std::sync::Arc;

use anyhow::{Context, Result};
use courier_coordinator::{GaugeLoadProbe, LeaderElector, QueueStatsJob};
use courier_core::{
    traits::{DistributedLock, LoadRegistry, TaskRepository},
    AppConfig,
};
use courier_infrastructure::{
    connect_redis, RedisDistributedLock, RedisLoadRegistry, SqliteTaskRepository,
};
use courier_worker::{LoggingExecutor, WorkerService};
use sqlx::sqlite::SqlitePoolOptions;
use tokio::sync::broadcast;
use tracing::info;

/// 每个在途任务折算的负载分数
const INFLIGHT_LOAD_SCALE: f64 = 10.0;

/// 应用实例：持有已装配好的Worker循环与选举循环
pub struct Application {
    config: AppConfig,
    worker: Arc<WorkerService>,
    elector: Arc<LeaderElector>,
}

impl Application {
    /// 装配全部组件：SQLite任务存储、Redis协调原语、Worker与选举器
    pub async fn new(config: AppConfig) -> Result<Self> {
        info!("初始化数据库连接: {}", config.database.url);
        let pool = SqlitePoolOptions::new()
            .max_connections(config.database.max_connections)
            .connect(&config.database.url)
            .await
            .with_context(|| format!("连接数据库失败: {}", config.database.url))?;

        let task_repo = SqliteTaskRepository::new(pool, config.worker.retry.clone());
        task_repo.migrate().await.context("初始化数据库表失败")?;
        let task_repo: Arc<dyn TaskRepository> = Arc::new(task_repo);

        info!("连接协调存储: {}", config.coordination.redis_url);
        let redis_conn = connect_redis(&config.coordination.redis_url)
            .await
            .context("连接Redis失败")?;
        let lock: Arc<dyn DistributedLock> = Arc::new(RedisDistributedLock::new(redis_conn.clone()));
        let registry: Arc<dyn LoadRegistry> = Arc::new(RedisLoadRegistry::new(
            redis_conn,
            config.coordination.load_key.clone(),
        ));

        let worker = Arc::new(WorkerService::new(
            config.node_id.clone(),
            Arc::clone(&task_repo),
            Arc::new(LoggingExecutor),
            config.worker.clone(),
        ));

        // 负载分数来自Worker的在途任务计数
        let probe = Arc::new(GaugeLoadProbe::new(
            worker.inflight_gauge(),
            INFLIGHT_LOAD_SCALE,
        ));
        let job = Arc::new(QueueStatsJob::new(
            Arc::clone(&task_repo),
            Arc::clone(&registry),
        ));
        let elector = Arc::new(LeaderElector::new(
            config.node_id.clone(),
            config.coordination.lock_key.clone(),
            config.elector.clone(),
            lock,
            registry,
            probe,
            job,
        ));

        Ok(Self {
            config,
            worker,
            elector,
        })
    }

    /// 按配置启动各循环，全部退出后返回
    pub async fn run(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let mut handles = Vec::new();

        if self.config.worker.enabled {
            let worker = Arc::clone(&self.worker);
            let rx = shutdown_rx.resubscribe();
            handles.push(tokio::spawn(async move { worker.run(rx).await }));
        } else {
            info!("Worker循环已禁用");
        }

        if self.config.elector.enabled {
            let elector = Arc::clone(&self.elector);
            let rx = shutdown_rx.resubscribe();
            handles.push(tokio::spawn(async move { elector.run(rx).await }));
        } else {
            info!("选举循环已禁用");
        }

        if handles.is_empty() {
            anyhow::bail!("Worker与选举循环均被禁用，无事可做");
        }

        for handle in handles {
            handle.await.context("组件任务异常退出")?;
        }
        Ok(())
    }
}
