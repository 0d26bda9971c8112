pub mod executors;
pub mod service;

pub use executors::LoggingExecutor;
pub use service::{PollOutcome, WorkerService};
