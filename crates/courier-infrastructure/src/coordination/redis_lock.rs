use std::time::Duration;

use async_trait::async_trait;
use courier_core::{traits::DistributedLock, CourierError, CourierResult};
use redis::aio::ConnectionManager;
use redis::Script;
use tracing::debug;

/// 基于Redis的分布式锁
///
/// 获取走 SET NX PX，过期记录由Redis的TTL自然消失；续约与释放
/// 必须校验持有者，用Lua脚本保证比较与操作的原子性。
pub struct RedisDistributedLock {
    conn: ConnectionManager,
    renew_script: Script,
    release_script: Script,
}

const RENEW_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('PEXPIRE', KEYS[1], ARGV[2])
else
    return 0
end
"#;

const RELEASE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
else
    return 0
end
"#;

impl RedisDistributedLock {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            renew_script: Script::new(RENEW_SCRIPT),
            release_script: Script::new(RELEASE_SCRIPT),
        }
    }
}

#[async_trait]
impl DistributedLock for RedisDistributedLock {
    async fn try_acquire(
        &self,
        key: &str,
        holder_id: &str,
        ttl: Duration,
    ) -> CourierResult<bool> {
        let mut conn = self.conn.clone();
        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(holder_id)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .map_err(|e| CourierError::Coordination(format!("获取锁失败: {e}")))?;

        let acquired = result.is_some();
        if acquired {
            debug!("节点 {} 获取锁 {} 成功, TTL={:?}", holder_id, key, ttl);
        }
        Ok(acquired)
    }

    async fn renew(&self, key: &str, holder_id: &str, ttl: Duration) -> CourierResult<bool> {
        let mut conn = self.conn.clone();
        let renewed: i64 = self
            .renew_script
            .key(key)
            .arg(holder_id)
            .arg(ttl.as_millis() as u64)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| CourierError::Coordination(format!("续约锁失败: {e}")))?;

        Ok(renewed == 1)
    }

    async fn release(&self, key: &str, holder_id: &str) -> CourierResult<()> {
        let mut conn = self.conn.clone();
        let _deleted: i64 = self
            .release_script
            .key(key)
            .arg(holder_id)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| CourierError::Coordination(format!("释放锁失败: {e}")))?;

        debug!("节点 {} 释放锁 {}", holder_id, key);
        Ok(())
    }
}
