use std::time::Duration;

use async_trait::async_trait;

use crate::errors::CourierResult;
use crate::models::{DeliveryTask, QueueStats};

/// 持久化任务存储
///
/// 所有跨Worker的互斥都由 `preempt` 的单条原子条件更新保证，
/// 调用方不得自行做读-改-写。
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// 入队一条新任务，next_time = now，返回存储分配的id
    async fn enqueue(&self, payload: serde_json::Value, retry_max: i32) -> CourierResult<i64>;

    /// 原子抢占一条可抢占任务
    ///
    /// 按 next_time 升序（同值按 id 升序）取最早到期的一条，置为
    /// Running 并写入 lease_expires_at = now + lease_ttl。无可抢占
    /// 任务时返回 Ok(None)。并发调用同一任务至多一个成功。
    async fn preempt(&self, lease_ttl: Duration) -> CourierResult<Option<DeliveryTask>>;

    /// 回报执行结果
    ///
    /// 成功 -> Succeeded（终态）。失败 -> retry_count+1；预算耗尽
    /// 则 Failed（终态），否则回到 Waiting 并按退避策略计算新的
    /// next_time。
    async fn report_result(&self, id: i64, succeeded: bool) -> CourierResult<()>;

    async fn get_by_id(&self, id: i64) -> CourierResult<Option<DeliveryTask>>;

    /// 各状态计数与到期积压量，供 Leader 全局汇总
    async fn stats(&self) -> CourierResult<QueueStats>;
}
