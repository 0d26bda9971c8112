use courier_core::{CourierError, CourierResult};
use redis::aio::ConnectionManager;
use tracing::debug;

/// 建立带自动重连的Redis连接并做PING探活
pub async fn connect_redis(redis_url: &str) -> CourierResult<ConnectionManager> {
    let client = redis::Client::open(redis_url)
        .map_err(|e| CourierError::Coordination(format!("创建Redis客户端失败: {e}")))?;

    let mut conn = ConnectionManager::new(client)
        .await
        .map_err(|e| CourierError::Coordination(format!("连接Redis失败: {e}")))?;

    let pong: String = redis::cmd("PING")
        .query_async(&mut conn)
        .await
        .map_err(|e| CourierError::Coordination(format!("Redis PING失败: {e}")))?;
    if pong != "PONG" {
        return Err(CourierError::Coordination(format!(
            "Redis PING返回异常: {pong}"
        )));
    }

    debug!("Redis连接建立成功: {}", redis_url);
    Ok(conn)
}
