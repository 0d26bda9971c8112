pub mod load;
pub mod task;

pub use load::{LoadEntry, QueueStats};
pub use task::{DeliveryTask, TaskStatus};
