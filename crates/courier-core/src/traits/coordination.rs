use std::time::Duration;

use async_trait::async_trait;

use crate::errors::CourierResult;
use crate::models::LoadEntry;

/// 分布式互斥锁
///
/// 同一key同一时刻至多一个持有者。瞬时存储错误应由调用方按
/// "非持有者"处理（fail-closed），避免脑裂。
#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// 仅当锁不存在或已过期时原子创建，返回本次调用是否成为持有者
    async fn try_acquire(&self, key: &str, holder_id: &str, ttl: Duration)
        -> CourierResult<bool>;

    /// 仅当调用方仍是持有者时延长过期时间；返回 false 表示所有权
    /// 已丢失，调用方必须立即停止以Leader身份工作
    async fn renew(&self, key: &str, holder_id: &str, ttl: Duration) -> CourierResult<bool>;

    /// 仅当仍由 holder_id 持有时删除锁记录，否则为幂等空操作
    async fn release(&self, key: &str, holder_id: &str) -> CourierResult<()>;
}

/// 按负载分数排序的节点注册表
///
/// 每个存活节点周期性上报自身负载，旧值被覆盖。注册表本身不做
/// TTL淘汰，失联节点的陈旧条目由外部健康检查通过 `remove` 清理。
#[async_trait]
pub trait LoadRegistry: Send + Sync {
    /// 幂等upsert
    async fn report_load(&self, node_id: &str, score: f64) -> CourierResult<()>;

    /// 返回负载分数最低的节点；同分按 node_id 字典序，保证选择
    /// 确定可测。注册表为空时返回 None
    async fn select_lowest(&self) -> CourierResult<Option<String>>;

    /// 全量快照，供监控
    async fn snapshot(&self) -> CourierResult<Vec<LoadEntry>>;

    /// 外部健康检查的清理钩子
    async fn remove(&self, node_id: &str) -> CourierResult<()>;
}
