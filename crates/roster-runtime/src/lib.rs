//! Ingestion loop, event handlers and privileged command flow for roster.

pub mod admin_gate;
pub mod backoff;
pub mod delivery;
pub mod handlers;
pub mod ingestion;
pub mod runtime;

#[cfg(test)]
mod test_support;

pub use admin_gate::{evaluate_admin_gate, AdminGateDecision};
pub use backoff::{BackoffDecision, BackoffPolicy};
pub use delivery::{deliver_report, edit_or_send, DeliveryOutcome, ReportDelivery};
pub use handlers::{EventHandler, RosterCommand, RosterEventHandler};
pub use ingestion::{run_ingestion_loop, IngestionState, TerminationReason};
pub use runtime::{run_roster_runtime, RosterRuntimeConfig};
