pub mod coordination;
pub mod executor;
pub mod repository;

pub use coordination::{DistributedLock, LoadRegistry};
pub use executor::{ExecutionResult, TaskExecutor};
pub use repository::TaskRepository;
