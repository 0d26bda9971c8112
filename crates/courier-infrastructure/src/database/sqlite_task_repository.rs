use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use courier_core::{
    models::{DeliveryTask, QueueStats},
    traits::TaskRepository,
    CourierError, CourierResult, RetryPolicy,
};
use sqlx::{Row, SqlitePool};
use tracing::{debug, warn};

/// 基于SQLite的持久化任务存储
///
/// 抢占通过单条带资格复查的条件UPDATE完成，互斥由存储层保证，
/// 不依赖任何应用层锁。
pub struct SqliteTaskRepository {
    pool: SqlitePool,
    retry_policy: RetryPolicy,
}

const TASK_COLUMNS: &str = "id, status, payload, retry_count, retry_max, \
     next_time, lease_expires_at, created_at, updated_at";

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool, retry_policy: RetryPolicy) -> Self {
        Self { pool, retry_policy }
    }

    /// 初始化表结构，可重复执行
    pub async fn migrate(&self) -> CourierResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS delivery_tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                status TEXT NOT NULL DEFAULT 'WAITING',
                payload TEXT NOT NULL,
                retry_count INTEGER NOT NULL DEFAULT 0,
                retry_max INTEGER NOT NULL,
                next_time TEXT NOT NULL,
                lease_expires_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_delivery_tasks_eligible
             ON delivery_tasks (status, next_time, lease_expires_at)",
        )
        .execute(&self.pool)
        .await?;

        debug!("任务存储表结构初始化完成");
        Ok(())
    }

    fn row_to_task(row: &sqlx::sqlite::SqliteRow) -> CourierResult<DeliveryTask> {
        let payload_text: String = row.try_get("payload")?;
        Ok(DeliveryTask {
            id: row.try_get("id")?,
            status: row.try_get("status")?,
            payload: serde_json::from_str(&payload_text)?,
            retry_count: row.try_get("retry_count")?,
            retry_max: row.try_get("retry_max")?,
            next_time: row.try_get("next_time")?,
            lease_expires_at: row.try_get("lease_expires_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    async fn enqueue(&self, payload: serde_json::Value, retry_max: i32) -> CourierResult<i64> {
        if retry_max < 1 {
            return Err(CourierError::InvalidParams(format!(
                "retry_max 必须大于等于1: {retry_max}"
            )));
        }

        let now = Utc::now();
        let row = sqlx::query(
            r#"
            INSERT INTO delivery_tasks (status, payload, retry_count, retry_max,
                                        next_time, lease_expires_at, created_at, updated_at)
            VALUES ('WAITING', $1, 0, $2, $3, NULL, $3, $3)
            RETURNING id
            "#,
        )
        .bind(payload.to_string())
        .bind(retry_max)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        let id: i64 = row.try_get("id")?;
        debug!("任务入队成功: id={}, retry_max={}", id, retry_max);
        Ok(id)
    }

    async fn preempt(&self, lease_ttl: Duration) -> CourierResult<Option<DeliveryTask>> {
        let now = Utc::now();
        let lease_expires_at = now
            + chrono::Duration::from_std(lease_ttl)
                .map_err(|e| CourierError::InvalidParams(format!("lease_ttl 无效: {e}")))?;

        // 子查询选出最早到期的可抢占任务，外层WHERE重复资格条件，
        // 两个并发调用不可能同时命中同一行
        let query = format!(
            r#"
            UPDATE delivery_tasks
            SET status = 'RUNNING', lease_expires_at = $2, updated_at = $1
            WHERE id = (
                SELECT id FROM delivery_tasks
                WHERE (status = 'WAITING' AND next_time <= $1)
                   OR (status = 'RUNNING' AND lease_expires_at IS NOT NULL
                       AND lease_expires_at <= $1)
                ORDER BY next_time ASC, id ASC
                LIMIT 1
            )
            AND ((status = 'WAITING' AND next_time <= $1)
                 OR (status = 'RUNNING' AND lease_expires_at IS NOT NULL
                     AND lease_expires_at <= $1))
            RETURNING {TASK_COLUMNS}
            "#
        );

        let row = sqlx::query(&query)
            .bind(now)
            .bind(lease_expires_at)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let task = Self::row_to_task(&row)?;
                debug!(
                    "抢占任务成功: id={}, 租约到期时间: {}",
                    task.id,
                    lease_expires_at.format("%Y-%m-%d %H:%M:%S UTC")
                );
                Ok(Some(task))
            }
            None => Ok(None),
        }
    }

    async fn report_result(&self, id: i64, succeeded: bool) -> CourierResult<()> {
        let task = self
            .get_by_id(id)
            .await?
            .ok_or(CourierError::TaskNotFound { id })?;

        if task.is_terminal() {
            warn!("任务 {} 已处于终态 {:?}，忽略重复回报", id, task.status);
            return Ok(());
        }

        let now = Utc::now();
        let result = if succeeded {
            sqlx::query(
                "UPDATE delivery_tasks
                 SET status = 'SUCCEEDED', lease_expires_at = NULL, updated_at = $2
                 WHERE id = $1",
            )
            .bind(id)
            .bind(now)
            .execute(&self.pool)
            .await?
        } else {
            let new_retry_count = task.retry_count + 1;
            if new_retry_count >= task.retry_max {
                debug!(
                    "任务 {} 已达到最大重试次数 {}，标记为失败",
                    id, task.retry_max
                );
                sqlx::query(
                    "UPDATE delivery_tasks
                     SET status = 'FAILED', retry_count = $2, lease_expires_at = NULL,
                         updated_at = $3
                     WHERE id = $1",
                )
                .bind(id)
                .bind(new_retry_count)
                .bind(now)
                .execute(&self.pool)
                .await?
            } else {
                let next_time = self.retry_policy.next_time(task.retry_count, now);
                debug!(
                    "任务 {} 执行失败，第 {} 次重试将在 {} 后进行",
                    id,
                    new_retry_count,
                    next_time.format("%Y-%m-%d %H:%M:%S UTC")
                );
                sqlx::query(
                    "UPDATE delivery_tasks
                     SET status = 'WAITING', retry_count = $2, next_time = $3,
                         lease_expires_at = NULL, updated_at = $4
                     WHERE id = $1",
                )
                .bind(id)
                .bind(new_retry_count)
                .bind(next_time)
                .bind(now)
                .execute(&self.pool)
                .await?
            }
        };

        if result.rows_affected() == 0 {
            return Err(CourierError::TaskNotFound { id });
        }
        Ok(())
    }

    async fn get_by_id(&self, id: i64) -> CourierResult<Option<DeliveryTask>> {
        let query = format!("SELECT {TASK_COLUMNS} FROM delivery_tasks WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(Self::row_to_task(&row)?)),
            None => Ok(None),
        }
    }

    async fn stats(&self) -> CourierResult<QueueStats> {
        let now = Utc::now();
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(CASE WHEN status = 'WAITING' THEN 1 END) as waiting,
                COUNT(CASE WHEN status = 'RUNNING' THEN 1 END) as running,
                COUNT(CASE WHEN status = 'SUCCEEDED' THEN 1 END) as succeeded,
                COUNT(CASE WHEN status = 'FAILED' THEN 1 END) as failed,
                COUNT(CASE WHEN (status = 'WAITING' AND next_time <= $1)
                             OR (status = 'RUNNING' AND lease_expires_at IS NOT NULL
                                 AND lease_expires_at <= $1)
                      THEN 1 END) as due_backlog
            FROM delivery_tasks
            "#,
        )
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(QueueStats {
            waiting: row.try_get("waiting")?,
            running: row.try_get("running")?,
            succeeded: row.try_get("succeeded")?,
            failed: row.try_get("failed")?,
            due_backlog: row.try_get("due_backlog")?,
            collected_at: now,
        })
    }
}
