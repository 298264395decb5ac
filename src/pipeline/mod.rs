//! Ingestion and read-path pipelines.
//!
//! - `diff`: three-way reconciliation of remote snapshots against stored rows
//! - `collector`: deadline-bounded fan-out building composite profiles
//! - `workers`: job handlers per source and the registry that binds them

pub mod collector;
pub mod diff;
pub mod workers;

pub use collector::ProfileCollector;
pub use diff::{DiffCalculator, DiffResult, Reconcile, calculate_diff};
pub use workers::{Clients, build_registry};
