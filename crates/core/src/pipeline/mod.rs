//! Pipeline controller.
//!
//! Single-shot orchestrator for one invocation: preflight checks, the
//! dry-run path, and the live path that wires the walker's event stream
//! into the work pool and translates signal events into shutdown requests.
//! Also hosts the verify/cleanup maintenance mode over the ledger.

mod controller;
mod maintenance;
mod types;

pub use controller::PipelineController;
pub use maintenance::{cleanup, verify, CleanupOutcome, MaintenanceEntry, VerifyReport};
pub use types::{IdleReason, PipelineError, PipelineOptions, RunOutcome, ShutdownRequest};
