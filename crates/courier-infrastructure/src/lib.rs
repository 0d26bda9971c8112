pub mod coordination;
pub mod database;

pub use coordination::{
    connect_redis, InMemoryLoadRegistry, InMemoryLock, RedisDistributedLock, RedisLoadRegistry,
};
pub use database::{InMemoryTaskRepository, SqliteTaskRepository};
