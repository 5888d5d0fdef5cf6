//! Alert Engine (spec §4.7): dedups typed host/probe/threshold events into
//! firing/resolved alert instances, keyed by rule+target, and fans firing
//! alerts out over NATS.

pub mod engine;
pub mod model;
pub mod store;

pub use engine::AlertEngine;
pub use model::{Alert, AlertEvent, AlertState};
pub use store::{AlertStore, InMemoryAlertStore};
