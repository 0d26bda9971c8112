use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::CourierResult;
use crate::models::DeliveryTask;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub output: Option<String>,
    pub error_message: Option<String>,
}

impl ExecutionResult {
    pub fn success(output: Option<String>) -> Self {
        Self {
            success: true,
            output,
            error_message: None,
        }
    }

    pub fn failure<S: Into<String>>(error_message: S) -> Self {
        Self {
            success: false,
            output: None,
            error_message: Some(error_message.into()),
        }
    }
}

/// 任务体执行器，由Worker循环注入
///
/// 超时由调用方控制；Err 与超时均按执行失败处理。
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self, task: &DeliveryTask) -> CourierResult<ExecutionResult>;
}
