use async_trait::async_trait;
use courier_core::{
    traits::{ExecutionResult, TaskExecutor},
    CourierResult, DeliveryTask,
};
use tracing::info;

/// 打印任务载荷的执行器，作为缺省投递实现和联调桩
pub struct LoggingExecutor;

#[async_trait]
impl TaskExecutor for LoggingExecutor {
    fn name(&self) -> &str {
        "logging"
    }

    async fn execute(&self, task: &DeliveryTask) -> CourierResult<ExecutionResult> {
        info!("投递任务 {}: {}", task.id, task.payload);
        Ok(ExecutionResult::success(Some(task.payload.to_string())))
    }
}

/// 前N次调用失败、之后成功的执行器
#[cfg(test)]
pub struct FlakyExecutor {
    failures_left: std::sync::atomic::AtomicU32,
}

#[cfg(test)]
impl FlakyExecutor {
    pub fn fail_times(n: u32) -> Self {
        Self {
            failures_left: std::sync::atomic::AtomicU32::new(n),
        }
    }

    pub fn always_succeed() -> Self {
        Self::fail_times(0)
    }

    pub fn always_fail() -> Self {
        Self::fail_times(u32::MAX)
    }
}

#[cfg(test)]
#[async_trait]
impl TaskExecutor for FlakyExecutor {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn execute(&self, _task: &DeliveryTask) -> CourierResult<ExecutionResult> {
        use std::sync::atomic::Ordering;

        let remaining = self.failures_left.load(Ordering::SeqCst);
        if remaining > 0 {
            if remaining != u32::MAX {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
            }
            return Ok(ExecutionResult::failure("下游暂时不可用"));
        }
        Ok(ExecutionResult::success(None))
    }
}

/// 固定耗时的执行器，用于验证超时路径
#[cfg(test)]
pub struct SlowExecutor {
    delay: std::time::Duration,
}

#[cfg(test)]
impl SlowExecutor {
    pub fn new(delay: std::time::Duration) -> Self {
        Self { delay }
    }
}

#[cfg(test)]
#[async_trait]
impl TaskExecutor for SlowExecutor {
    fn name(&self) -> &str {
        "slow"
    }

    async fn execute(&self, _task: &DeliveryTask) -> CourierResult<ExecutionResult> {
        tokio::time::sleep(self.delay).await;
        Ok(ExecutionResult::success(None))
    }
}
