pub mod config;
pub mod errors;
pub mod models;
pub mod retry;
pub mod traits;

pub use config::{AppConfig, CoordinationConfig, DatabaseConfig, ElectorConfig, WorkerConfig};
pub use errors::{CourierError, CourierResult};
pub use models::{DeliveryTask, LoadEntry, QueueStats, TaskStatus};
pub use retry::RetryPolicy;
pub use traits::{
    DistributedLock, ExecutionResult, LoadRegistry, TaskExecutor, TaskRepository,
};
