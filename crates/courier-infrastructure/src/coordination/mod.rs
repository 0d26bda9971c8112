pub mod connection;
pub mod memory;
pub mod redis_load_registry;
pub mod redis_lock;

pub use connection::connect_redis;
pub use memory::{InMemoryLoadRegistry, InMemoryLock};
pub use redis_load_registry::RedisLoadRegistry;
pub use redis_lock::RedisDistributedLock;
