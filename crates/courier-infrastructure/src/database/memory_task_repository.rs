use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use courier_core::{
    models::{DeliveryTask, QueueStats, TaskStatus},
    traits::TaskRepository,
    CourierError, CourierResult, RetryPolicy,
};
use tracing::warn;

/// 内存版任务存储
///
/// 与SQLite实现保持完全相同的抢占与回报语义，用于单元测试和
/// 无外部依赖的嵌入式场景。Mutex临界区即是抢占的原子边界。
pub struct InMemoryTaskRepository {
    inner: Mutex<Inner>,
    retry_policy: RetryPolicy,
}

struct Inner {
    tasks: BTreeMap<i64, DeliveryTask>,
    next_id: i64,
}

impl InMemoryTaskRepository {
    pub fn new(retry_policy: RetryPolicy) -> Self {
        Self {
            inner: Mutex::new(Inner {
                tasks: BTreeMap::new(),
                next_id: 1,
            }),
            retry_policy,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryTaskRepository {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn enqueue(&self, payload: serde_json::Value, retry_max: i32) -> CourierResult<i64> {
        if retry_max < 1 {
            return Err(CourierError::InvalidParams(format!(
                "retry_max 必须大于等于1: {retry_max}"
            )));
        }

        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_id;
        inner.next_id += 1;

        let mut task = DeliveryTask::new(payload, retry_max);
        task.id = id;
        inner.tasks.insert(id, task);
        Ok(id)
    }

    async fn preempt(&self, lease_ttl: Duration) -> CourierResult<Option<DeliveryTask>> {
        let now = Utc::now();
        let lease_expires_at = now
            + chrono::Duration::from_std(lease_ttl)
                .map_err(|e| CourierError::InvalidParams(format!("lease_ttl 无效: {e}")))?;

        let mut inner = self.inner.lock().unwrap();
        // BTreeMap按id升序遍历，min_by_key取 (next_time, id) 最小者，
        // 与SQLite的 ORDER BY next_time ASC, id ASC 一致
        let candidate = inner
            .tasks
            .values()
            .filter(|task| task.is_eligible(now))
            .min_by_key(|task| (task.next_time, task.id))
            .map(|task| task.id);

        match candidate {
            Some(id) => {
                let task = inner.tasks.get_mut(&id).expect("候选任务必然存在");
                task.status = TaskStatus::Running;
                task.lease_expires_at = Some(lease_expires_at);
                task.updated_at = now;
                Ok(Some(task.clone()))
            }
            None => Ok(None),
        }
    }

    async fn report_result(&self, id: i64, succeeded: bool) -> CourierResult<()> {
        let now = Utc::now();
        let mut inner = self.inner.lock().unwrap();
        let task = inner
            .tasks
            .get_mut(&id)
            .ok_or(CourierError::TaskNotFound { id })?;

        if task.is_terminal() {
            warn!("任务 {} 已处于终态 {:?}，忽略重复回报", id, task.status);
            return Ok(());
        }

        if succeeded {
            task.status = TaskStatus::Succeeded;
            task.lease_expires_at = None;
        } else {
            let prior_retry_count = task.retry_count;
            task.retry_count += 1;
            task.lease_expires_at = None;
            if task.retry_count >= task.retry_max {
                task.status = TaskStatus::Failed;
            } else {
                task.status = TaskStatus::Waiting;
                task.next_time = self.retry_policy.next_time(prior_retry_count, now);
            }
        }
        task.updated_at = now;
        Ok(())
    }

    async fn get_by_id(&self, id: i64) -> CourierResult<Option<DeliveryTask>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.tasks.get(&id).cloned())
    }

    async fn stats(&self) -> CourierResult<QueueStats> {
        let now = Utc::now();
        let inner = self.inner.lock().unwrap();

        let mut stats = QueueStats {
            waiting: 0,
            running: 0,
            succeeded: 0,
            failed: 0,
            due_backlog: 0,
            collected_at: now,
        };
        for task in inner.tasks.values() {
            match task.status {
                TaskStatus::Waiting => stats.waiting += 1,
                TaskStatus::Running => stats.running += 1,
                TaskStatus::Succeeded => stats.succeeded += 1,
                TaskStatus::Failed => stats.failed += 1,
            }
            if task.is_eligible(now) {
                stats.due_backlog += 1;
            }
        }
        Ok(stats)
    }
}
