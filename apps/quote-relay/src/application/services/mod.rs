//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `Scheduler`: Fires refresh triggers at startup, on an interval and on demand
//! - `Producer`: Fetches quotes and publishes update events
//! - `ConsumerGroup`: Persists update events received under a queue group
//! - `StatisticsService`: Latest value and rolling deviation queries

mod consumer;
mod producer;
mod scheduler;
mod stats;

pub use consumer::{ConsumerGroup, ConsumerMember, ConsumerStats};
pub use producer::{CycleReport, Producer};
pub use scheduler::{
    DEFAULT_REFRESH_INTERVAL_MINUTES, RefreshHandler, Scheduler, SchedulerState, Trigger,
    TriggerError, TriggerHandle,
};
pub use stats::{StatisticsService, StatsError};
