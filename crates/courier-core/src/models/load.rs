use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 负载注册表中的一项: 节点标识与其自报的负载分数（越低越空闲）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadEntry {
    pub node_id: String,
    pub score: f64,
}

/// 任务队列的全局统计，供 Leader 周期性汇总输出
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStats {
    pub waiting: i64,
    pub running: i64,
    pub succeeded: i64,
    pub failed: i64,
    /// 当前已到期可抢占的积压量
    pub due_backlog: i64,
    pub collected_at: DateTime<Utc>,
}

impl QueueStats {
    pub fn total(&self) -> i64 {
        self.waiting + self.running + self.succeeded + self.failed
    }
}
