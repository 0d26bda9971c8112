use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use courier_core::{
    traits::{ExecutionResult, TaskExecutor, TaskRepository},
    CourierError, CourierResult, WorkerConfig,
};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// 单次存储调用的时间预算，存储失联时当次轮询以出错结束而不是
/// 永久挂起循环
const STORE_OP_TIMEOUT: Duration = Duration::from_secs(1);

/// 单次轮询的结果，驱动主循环的节奏
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// 抢到并执行了一条任务，可立即进行下一轮
    Executed { task_id: i64, succeeded: bool },
    /// 队列中没有可抢占任务
    Idle,
    /// 存储访问失败，需要退避
    StoreError,
}

/// 任务抢占执行循环
///
/// 抢占、执行、回报三步串行；执行受超时约束，超时与执行器出错
/// 一律按失败回报，由存储层决定重试还是进入终态。
pub struct WorkerService {
    node_id: String,
    task_repo: Arc<dyn TaskRepository>,
    executor: Arc<dyn TaskExecutor>,
    config: WorkerConfig,
    /// 在途任务计数，供负载探针读取
    inflight: Arc<AtomicI64>,
}

impl WorkerService {
    pub fn new(
        node_id: impl Into<String>,
        task_repo: Arc<dyn TaskRepository>,
        executor: Arc<dyn TaskExecutor>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            task_repo,
            executor,
            config,
            inflight: Arc::new(AtomicI64::new(0)),
        }
    }

    /// 在途任务计数的共享句柄
    pub fn inflight_gauge(&self) -> Arc<AtomicI64> {
        Arc::clone(&self.inflight)
    }

    fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.config.lease_ttl_seconds)
    }

    fn execute_timeout(&self) -> Duration {
        Duration::from_secs(self.config.execute_timeout_seconds)
    }

    async fn bounded_store_call<T>(
        &self,
        op: &str,
        fut: impl std::future::Future<Output = CourierResult<T>> + Send,
    ) -> CourierResult<T> {
        match tokio::time::timeout(STORE_OP_TIMEOUT, fut).await {
            Ok(result) => result,
            Err(_) => Err(CourierError::Timeout(format!("存储操作 {op} 超时"))),
        }
    }

    /// 抢占并执行一条任务；公开以便测试确定性单步驱动
    pub async fn poll_once(&self) -> PollOutcome {
        let task = match self
            .bounded_store_call("preempt", self.task_repo.preempt(self.lease_ttl()))
            .await
        {
            Ok(Some(task)) => task,
            Ok(None) => return PollOutcome::Idle,
            Err(e) => {
                warn!("节点 {} 抢占任务失败: {}", self.node_id, e);
                return PollOutcome::StoreError;
            }
        };

        let task_id = task.id;
        debug!(
            "节点 {} 抢占到任务 {}, retry_count={}",
            self.node_id, task_id, task.retry_count
        );

        self.inflight.fetch_add(1, Ordering::Relaxed);
        let result = self.execute_with_timeout(&task).await;
        self.inflight.fetch_sub(1, Ordering::Relaxed);

        let succeeded = result.success;
        if succeeded {
            info!("节点 {} 任务 {} 执行成功", self.node_id, task_id);
        } else {
            warn!(
                "节点 {} 任务 {} 执行失败: {}",
                self.node_id,
                task_id,
                result.error_message.as_deref().unwrap_or("unknown")
            );
        }

        if let Err(e) = self
            .bounded_store_call(
                "report_result",
                self.task_repo.report_result(task_id, succeeded),
            )
            .await
        {
            // 已执行但回报失败是最危险的状态: 租约到期后该任务会被
            // 重新抢占执行，需要人工或对账介入
            error!(
                "节点 {} 任务 {} 已执行(succeeded={})但回报结果失败: {}",
                self.node_id, task_id, succeeded, e
            );
        }

        PollOutcome::Executed { task_id, succeeded }
    }

    async fn execute_with_timeout(
        &self,
        task: &courier_core::DeliveryTask,
    ) -> ExecutionResult {
        match tokio::time::timeout(self.execute_timeout(), self.executor.execute(task)).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => ExecutionResult::failure(format!("执行器出错: {e}")),
            Err(_) => ExecutionResult::failure(format!(
                "执行超时({}s)",
                self.config.execute_timeout_seconds
            )),
        }
    }

    /// Worker主循环，随shutdown信号退出
    ///
    /// 抢到任务时立刻进行下一轮以尽快清空积压；空转或存储出错时
    /// 退避 poll_backoff_ms 再试。
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            "节点 {} Worker循环启动, executor={}, 租约TTL={}s, 执行超时={}s",
            self.node_id,
            self.executor.name(),
            self.config.lease_ttl_seconds,
            self.config.execute_timeout_seconds
        );

        loop {
            let outcome = tokio::select! {
                outcome = self.poll_once() => outcome,
                _ = shutdown_rx.recv() => {
                    info!("节点 {} Worker循环收到关闭信号", self.node_id);
                    break;
                }
            };

            if matches!(outcome, PollOutcome::Executed { .. }) {
                continue;
            }

            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(self.config.poll_backoff_ms)) => {}
                _ = shutdown_rx.recv() => {
                    info!("节点 {} Worker循环收到关闭信号", self.node_id);
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executors::{FlakyExecutor, SlowExecutor};
    use courier_core::{RetryPolicy, TaskStatus};
    use courier_infrastructure::InMemoryTaskRepository;
    use serde_json::json;

    fn test_config() -> WorkerConfig {
        WorkerConfig {
            enabled: true,
            poll_backoff_ms: 10,
            lease_ttl_seconds: 30,
            execute_timeout_seconds: 1,
            default_retry_max: 3,
            retry: RetryPolicy::Fixed {
                interval_seconds: 0,
            },
        }
    }

    fn repo() -> Arc<InMemoryTaskRepository> {
        Arc::new(InMemoryTaskRepository::new(RetryPolicy::Fixed {
            interval_seconds: 0,
        }))
    }

    /// 所有调用都永久挂起的存储，模拟数据库失联
    struct StalledRepository;

    #[async_trait::async_trait]
    impl TaskRepository for StalledRepository {
        async fn enqueue(
            &self,
            _payload: serde_json::Value,
            _retry_max: i32,
        ) -> courier_core::CourierResult<i64> {
            std::future::pending().await
        }

        async fn preempt(
            &self,
            _lease_ttl: Duration,
        ) -> courier_core::CourierResult<Option<courier_core::DeliveryTask>> {
            std::future::pending().await
        }

        async fn report_result(
            &self,
            _id: i64,
            _succeeded: bool,
        ) -> courier_core::CourierResult<()> {
            std::future::pending().await
        }

        async fn get_by_id(
            &self,
            _id: i64,
        ) -> courier_core::CourierResult<Option<courier_core::DeliveryTask>> {
            std::future::pending().await
        }

        async fn stats(&self) -> courier_core::CourierResult<courier_core::QueueStats> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_stalled_store_yields_store_error_within_budget() {
        let service = WorkerService::new(
            "node-a",
            Arc::new(StalledRepository),
            Arc::new(FlakyExecutor::always_succeed()),
            test_config(),
        );

        // 存储永久挂起时 poll_once 必须在调用预算内以出错返回，
        // 交由主循环退避重试
        let outcome = tokio::time::timeout(Duration::from_secs(5), service.poll_once())
            .await
            .expect("存储失联不应挂起轮询");
        assert_eq!(outcome, PollOutcome::StoreError);
    }

    #[tokio::test]
    async fn test_poll_once_idle_on_empty_queue() {
        let repo = repo();
        let service = WorkerService::new(
            "node-a",
            Arc::clone(&repo) as Arc<dyn TaskRepository>,
            Arc::new(FlakyExecutor::always_succeed()),
            test_config(),
        );

        assert_eq!(service.poll_once().await, PollOutcome::Idle);
    }

    #[tokio::test]
    async fn test_poll_once_executes_and_reports_success() {
        let repo = repo();
        let id = repo.enqueue(json!({"to": "user-1"}), 3).await.unwrap();

        let service = WorkerService::new(
            "node-a",
            Arc::clone(&repo) as Arc<dyn TaskRepository>,
            Arc::new(FlakyExecutor::always_succeed()),
            test_config(),
        );

        assert_eq!(
            service.poll_once().await,
            PollOutcome::Executed {
                task_id: id,
                succeeded: true
            }
        );
        let task = repo.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Succeeded);
        assert!(task.lease_expires_at.is_none());
    }

    #[tokio::test]
    async fn test_failed_execution_requeues_with_incremented_retry() {
        let repo = repo();
        let id = repo.enqueue(json!({"to": "user-1"}), 3).await.unwrap();

        let service = WorkerService::new(
            "node-a",
            Arc::clone(&repo) as Arc<dyn TaskRepository>,
            Arc::new(FlakyExecutor::always_fail()),
            test_config(),
        );

        assert_eq!(
            service.poll_once().await,
            PollOutcome::Executed {
                task_id: id,
                succeeded: false
            }
        );
        let task = repo.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Waiting);
        assert_eq!(task.retry_count, 1);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let repo = repo();
        let id = repo.enqueue(json!({"to": "user-1"}), 3).await.unwrap();

        // 执行耗时远超1s超时
        let service = WorkerService::new(
            "node-a",
            Arc::clone(&repo) as Arc<dyn TaskRepository>,
            Arc::new(SlowExecutor::new(Duration::from_secs(30))),
            test_config(),
        );

        assert_eq!(
            service.poll_once().await,
            PollOutcome::Executed {
                task_id: id,
                succeeded: false
            }
        );
        let task = repo.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Waiting);
        assert_eq!(task.retry_count, 1);
    }

    #[tokio::test]
    async fn test_retry_budget_exhaustion_reaches_failed() {
        let repo = repo();
        let id = repo.enqueue(json!({"to": "user-1"}), 2).await.unwrap();

        let service = WorkerService::new(
            "node-a",
            Arc::clone(&repo) as Arc<dyn TaskRepository>,
            Arc::new(FlakyExecutor::always_fail()),
            test_config(),
        );

        // 退避间隔为0，连续两轮耗尽 retry_max=2 的预算
        service.poll_once().await;
        service.poll_once().await;

        let task = repo.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.retry_count, 2);
        // 终态任务不再被抢占
        assert_eq!(service.poll_once().await, PollOutcome::Idle);
    }

    #[tokio::test]
    async fn test_eventual_success_after_transient_failures() {
        let repo = repo();
        let id = repo.enqueue(json!({"to": "user-1"}), 5).await.unwrap();

        // 前两次失败，第三次成功
        let service = WorkerService::new(
            "node-a",
            Arc::clone(&repo) as Arc<dyn TaskRepository>,
            Arc::new(FlakyExecutor::fail_times(2)),
            test_config(),
        );

        service.poll_once().await;
        service.poll_once().await;
        assert_eq!(
            service.poll_once().await,
            PollOutcome::Executed {
                task_id: id,
                succeeded: true
            }
        );

        let task = repo.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Succeeded);
        assert_eq!(task.retry_count, 2);
    }

    #[tokio::test]
    async fn test_inflight_gauge_returns_to_zero() {
        let repo = repo();
        repo.enqueue(json!({"to": "user-1"}), 3).await.unwrap();

        let service = WorkerService::new(
            "node-a",
            Arc::clone(&repo) as Arc<dyn TaskRepository>,
            Arc::new(FlakyExecutor::always_succeed()),
            test_config(),
        );
        let gauge = service.inflight_gauge();

        service.poll_once().await;
        assert_eq!(gauge.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_run_loop_drains_queue_and_stops_on_shutdown() {
        let repo = repo();
        for i in 0..5 {
            repo.enqueue(json!({"seq": i}), 3).await.unwrap();
        }

        let service = Arc::new(WorkerService::new(
            "node-a",
            Arc::clone(&repo) as Arc<dyn TaskRepository>,
            Arc::new(FlakyExecutor::always_succeed()),
            test_config(),
        ));

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.run(shutdown_rx).await })
        };

        tokio::time::sleep(Duration::from_millis(200)).await;
        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();

        let stats = repo.stats().await.unwrap();
        assert_eq!(stats.succeeded, 5);
        assert_eq!(stats.waiting, 0);
        assert_eq!(stats.running, 0);
    }
}
