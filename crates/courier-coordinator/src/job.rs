use std::sync::Arc;

use async_trait::async_trait;
use courier_core::{
    traits::{LoadRegistry, TaskRepository},
    CourierResult,
};
use tracing::info;

/// 集群单例周期任务，只在当选Leader的节点上执行
///
/// 续约间隔内的极端情况可能出现至多一次重复执行，任务体自身
/// 必须幂等。
#[async_trait]
pub trait LeaderJob: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self) -> CourierResult<()>;
}

/// 汇总全局队列状态与集群负载视图并输出
pub struct QueueStatsJob {
    task_repo: Arc<dyn TaskRepository>,
    registry: Arc<dyn LoadRegistry>,
}

impl QueueStatsJob {
    pub fn new(task_repo: Arc<dyn TaskRepository>, registry: Arc<dyn LoadRegistry>) -> Self {
        Self {
            task_repo,
            registry,
        }
    }
}

#[async_trait]
impl LeaderJob for QueueStatsJob {
    fn name(&self) -> &str {
        "queue_stats"
    }

    async fn run(&self) -> CourierResult<()> {
        let stats = self.task_repo.stats().await?;
        let nodes = self.registry.snapshot().await?;

        info!(
            "全局队列统计: waiting={}, running={}, succeeded={}, failed={}, 到期积压={}, 在线节点数={}",
            stats.waiting,
            stats.running,
            stats.succeeded,
            stats.failed,
            stats.due_backlog,
            nodes.len()
        );
        Ok(())
    }
}
