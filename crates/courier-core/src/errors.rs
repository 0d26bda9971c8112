use thiserror::Error;

#[derive(Error, Debug)]
pub enum CourierError {
    #[error("任务存储操作失败: {0}")]
    Store(String),
    #[error("协调存储操作失败: {0}")]
    Coordination(String),
    #[error("任务不存在: id={id}")]
    TaskNotFound { id: i64 },
    #[error("锁所有权已丢失: key={key}")]
    LeaseLost { key: String },
    #[error("参数无效: {0}")]
    InvalidParams(String),
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("数据序列化错误: {0}")]
    Serialization(String),
    #[error("操作超时: {0}")]
    Timeout(String),
    #[error("系统内部错误: {0}")]
    Internal(String),
}

pub type CourierResult<T> = std::result::Result<T, CourierError>;

impl CourierError {
    pub fn store_error<S: Into<String>>(msg: S) -> Self {
        Self::Store(msg.into())
    }
    pub fn coordination_error<S: Into<String>>(msg: S) -> Self {
        Self::Coordination(msg.into())
    }
    pub fn task_not_found(id: i64) -> Self {
        Self::TaskNotFound { id }
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    /// 瞬时错误，循环内退避后重试即可，不应终止进程
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CourierError::Store(_) | CourierError::Coordination(_) | CourierError::Timeout(_)
        )
    }
}

impl From<sqlx::Error> for CourierError {
    fn from(err: sqlx::Error) -> Self {
        CourierError::Store(err.to_string())
    }
}

impl From<serde_json::Error> for CourierError {
    fn from(err: serde_json::Error) -> Self {
        CourierError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for CourierError {
    fn from(err: anyhow::Error) -> Self {
        CourierError::Internal(err.to_string())
    }
}
