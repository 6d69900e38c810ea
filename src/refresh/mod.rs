pub mod health;
pub mod scheduler;

pub use health::{ConnectionState, HealthTracker, Transition};
pub use scheduler::{RefreshConfig, RefreshScheduler, ViewConsumer};
