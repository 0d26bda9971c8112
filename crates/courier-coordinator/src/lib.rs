pub mod elector;
pub mod job;
pub mod load;

pub use elector::{ElectorState, LeaderElector};
pub use job::{LeaderJob, QueueStatsJob};
pub use load::{FixedLoadProbe, GaugeLoadProbe, LoadProbe};
