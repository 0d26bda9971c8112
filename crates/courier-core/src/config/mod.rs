use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{CourierError, CourierResult};
use crate::retry::RetryPolicy;

/// 应用配置
///
/// TOML文件按节反序列化，缺省节取默认值，加载后统一校验。
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// 集群内节点标识；留空时由启动入口按 hostname 生成
    #[serde(default)]
    pub node_id: String,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub coordination: CoordinationConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub elector: ElectorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinationConfig {
    pub redis_url: String,
    /// 选举锁的公共key
    pub lock_key: String,
    /// 负载注册表的有序集合key
    pub load_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub enabled: bool,
    /// 队列空转或存储出错时的退避间隔
    pub poll_backoff_ms: u64,
    pub lease_ttl_seconds: u64,
    pub execute_timeout_seconds: u64,
    pub default_retry_max: i32,
    #[serde(default)]
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectorConfig {
    pub enabled: bool,
    pub tick_interval_seconds: u64,
    pub lock_ttl_seconds: u64,
    /// Leader负载超过该阈值时主动让出角色
    pub load_threshold: f64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://courier.db?mode=rwc".to_string(),
            max_connections: 5,
        }
    }
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            lock_key: "courier:election_lock".to_string(),
            load_key: "courier:node_loads".to_string(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_backoff_ms: 1000,
            lease_ttl_seconds: 30,
            execute_timeout_seconds: 10,
            default_retry_max: 3,
            retry: RetryPolicy::default(),
        }
    }
}

impl Default for ElectorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_interval_seconds: 3,
            lock_ttl_seconds: 10,
            load_threshold: 80.0,
        }
    }
}

impl AppConfig {
    /// 从TOML文件加载配置；文件不存在时使用默认配置
    pub fn load(config_path: Option<&str>) -> CourierResult<Self> {
        let config = match config_path {
            Some(path) if Path::new(path).exists() => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    CourierError::Configuration(format!("读取配置文件失败 {path}: {e}"))
                })?;
                toml::from_str(&content).map_err(|e| {
                    CourierError::Configuration(format!("解析配置文件失败 {path}: {e}"))
                })?
            }
            _ => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> CourierResult<()> {
        if self.database.url.is_empty() {
            return Err(CourierError::config_error("database.url 不能为空"));
        }
        if self.database.max_connections == 0 {
            return Err(CourierError::config_error(
                "database.max_connections 必须大于0",
            ));
        }
        if self.coordination.redis_url.is_empty() {
            return Err(CourierError::config_error("coordination.redis_url 不能为空"));
        }
        if self.coordination.lock_key.is_empty() || self.coordination.load_key.is_empty() {
            return Err(CourierError::config_error(
                "coordination.lock_key 与 load_key 不能为空",
            ));
        }
        if self.worker.poll_backoff_ms == 0 {
            return Err(CourierError::config_error("worker.poll_backoff_ms 必须大于0"));
        }
        if self.worker.lease_ttl_seconds == 0 {
            return Err(CourierError::config_error(
                "worker.lease_ttl_seconds 必须大于0",
            ));
        }
        if self.worker.execute_timeout_seconds == 0 {
            return Err(CourierError::config_error(
                "worker.execute_timeout_seconds 必须大于0",
            ));
        }
        if self.worker.default_retry_max < 1 {
            return Err(CourierError::config_error(
                "worker.default_retry_max 必须大于等于1",
            ));
        }
        self.worker
            .retry
            .validate()
            .map_err(CourierError::config_error)?;
        if self.elector.tick_interval_seconds == 0 {
            return Err(CourierError::config_error(
                "elector.tick_interval_seconds 必须大于0",
            ));
        }
        if self.elector.lock_ttl_seconds <= self.elector.tick_interval_seconds {
            // 锁TTL必须覆盖至少一个续约周期，否则正常节奏下也会丢锁
            return Err(CourierError::config_error(
                "elector.lock_ttl_seconds 必须大于 tick_interval_seconds",
            ));
        }
        if self.elector.load_threshold <= 0.0 {
            return Err(CourierError::config_error(
                "elector.load_threshold 必须大于0",
            ));
        }
        Ok(())
    }
}
