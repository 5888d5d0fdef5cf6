//! Distributed Task Scheduler (spec §4.6): cron/one-shot task definitions,
//! leader-elected firing via [`lease::TaskLease`], retry/backoff, and
//! timeout/grace-period enforcement around a pluggable [`store::TaskHandler`].

pub mod lease;
pub mod model;
pub mod scheduler;
pub mod store;

pub use lease::{generate_node_id, TaskLease};
pub use model::{ExecutionState, ScheduledTask, TaskExecution, TaskStatistics, TriggerType};
pub use scheduler::{TaskHandler, TaskScheduler};
pub use store::{InMemoryTaskStore, PgTaskStore, TaskStore};
