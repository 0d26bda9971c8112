use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 一条延迟投递任务
///
/// 生命周期: Waiting -> (抢占) Running -> Succeeded/Failed；
/// 租约过期的 Running 任务会重新进入可抢占池，状态保持 Running，
/// 以保留重试与租约历史。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryTask {
    pub id: i64,
    pub status: TaskStatus,
    /// 对调度器不透明的任务负载
    pub payload: serde_json::Value,
    pub retry_count: i32,
    pub retry_max: i32,
    /// 到达该时间后任务才可被抢占，支持延迟执行与重试冷却
    pub next_time: DateTime<Utc>,
    /// 抢占时写入；过期未续约即视为持有者已死
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    #[serde(rename = "WAITING")]
    Waiting,
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "SUCCEEDED")]
    Succeeded,
    #[serde(rename = "FAILED")]
    Failed,
}

impl sqlx::Type<sqlx::Sqlite> for TaskStatus {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for TaskStatus {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        match s {
            "WAITING" => Ok(TaskStatus::Waiting),
            "RUNNING" => Ok(TaskStatus::Running),
            "SUCCEEDED" => Ok(TaskStatus::Succeeded),
            "FAILED" => Ok(TaskStatus::Failed),
            _ => Err(format!("Invalid task status: {s}").into()),
        }
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for TaskStatus {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str(), buf)
    }
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Waiting => "WAITING",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Succeeded => "SUCCEEDED",
            TaskStatus::Failed => "FAILED",
        }
    }
}

impl DeliveryTask {
    pub fn new(payload: serde_json::Value, retry_max: i32) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // 将由存储生成
            status: TaskStatus::Waiting,
            payload,
            retry_count: 0,
            retry_max,
            next_time: now,
            lease_expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// 终态任务不再参与任何状态转移
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, TaskStatus::Succeeded | TaskStatus::Failed)
    }

    /// 抢占资格判定:
    /// Waiting 且到达调度时间，或 Running 但租约已过期（持有者被视为已死或卡住）
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            TaskStatus::Waiting => self.next_time <= now,
            TaskStatus::Running => self
                .lease_expires_at
                .map(|expires| expires <= now)
                .unwrap_or(false),
            TaskStatus::Succeeded | TaskStatus::Failed => false,
        }
    }

    pub fn retry_budget_exhausted(&self) -> bool {
        self.retry_count >= self.retry_max
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_new_task_is_waiting_and_due() {
        let task = DeliveryTask::new(serde_json::json!({"to": "user-1"}), 3);
        assert_eq!(task.status, TaskStatus::Waiting);
        assert_eq!(task.retry_count, 0);
        assert!(task.lease_expires_at.is_none());
        assert!(task.is_eligible(Utc::now() + Duration::seconds(1)));
    }

    #[test]
    fn test_waiting_task_not_eligible_before_next_time() {
        let mut task = DeliveryTask::new(serde_json::json!({}), 3);
        task.next_time = Utc::now() + Duration::seconds(60);
        assert!(!task.is_eligible(Utc::now()));
    }

    #[test]
    fn test_running_task_eligible_only_after_lease_expiry() {
        let now = Utc::now();
        let mut task = DeliveryTask::new(serde_json::json!({}), 3);
        task.status = TaskStatus::Running;

        task.lease_expires_at = Some(now + Duration::seconds(30));
        assert!(!task.is_eligible(now));

        task.lease_expires_at = Some(now - Duration::seconds(1));
        assert!(task.is_eligible(now));

        // 无租约信息的 Running 任务不可抢占
        task.lease_expires_at = None;
        assert!(!task.is_eligible(now));
    }

    #[test]
    fn test_terminal_tasks_never_eligible() {
        let now = Utc::now();
        let mut task = DeliveryTask::new(serde_json::json!({}), 3);

        task.status = TaskStatus::Succeeded;
        assert!(task.is_terminal());
        assert!(!task.is_eligible(now));

        task.status = TaskStatus::Failed;
        assert!(task.is_terminal());
        assert!(!task.is_eligible(now));
    }
}
