use async_trait::async_trait;
use courier_core::{models::LoadEntry, traits::LoadRegistry, CourierError, CourierResult};
use redis::aio::ConnectionManager;

/// 基于Redis有序集合的负载注册表
///
/// 分数即负载，ZADD天然幂等覆盖；最低负载选择是一次 ZRANGE 0 0，
/// 同分成员按字典序排列，选择因此是确定的。
pub struct RedisLoadRegistry {
    conn: ConnectionManager,
    key: String,
}

impl RedisLoadRegistry {
    pub fn new(conn: ConnectionManager, key: impl Into<String>) -> Self {
        Self {
            conn,
            key: key.into(),
        }
    }
}

#[async_trait]
impl LoadRegistry for RedisLoadRegistry {
    async fn report_load(&self, node_id: &str, score: f64) -> CourierResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("ZADD")
            .arg(&self.key)
            .arg(score)
            .arg(node_id)
            .query_async(&mut conn)
            .await
            .map_err(|e| CourierError::Coordination(format!("上报负载失败: {e}")))?;
        Ok(())
    }

    async fn select_lowest(&self) -> CourierResult<Option<String>> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = redis::cmd("ZRANGE")
            .arg(&self.key)
            .arg(0)
            .arg(0)
            .query_async(&mut conn)
            .await
            .map_err(|e| CourierError::Coordination(format!("查询最低负载节点失败: {e}")))?;
        Ok(members.into_iter().next())
    }

    async fn snapshot(&self) -> CourierResult<Vec<LoadEntry>> {
        let mut conn = self.conn.clone();
        let entries: Vec<(String, f64)> = redis::cmd("ZRANGE")
            .arg(&self.key)
            .arg(0)
            .arg(-1)
            .arg("WITHSCORES")
            .query_async(&mut conn)
            .await
            .map_err(|e| CourierError::Coordination(format!("读取负载快照失败: {e}")))?;

        Ok(entries
            .into_iter()
            .map(|(node_id, score)| LoadEntry { node_id, score })
            .collect())
    }

    async fn remove(&self, node_id: &str) -> CourierResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("ZREM")
            .arg(&self.key)
            .arg(node_id)
            .query_async(&mut conn)
            .await
            .map_err(|e| CourierError::Coordination(format!("移除负载条目失败: {e}")))?;
        Ok(())
    }
}
