//! Fotoflow Services
//!
//! The intake service (transactional intent recording, presigned-plan
//! minting, the mark-ready callback) and the reconciliation jobs (stalled
//! sweep, retention purge, administrative bulk delete) with their scheduler.

pub mod intake;
pub mod reconcile;
pub mod scheduler;

pub use intake::{IngestEntry, IngestOutcome, IngestRequest, IngestedItem, IntakeService};
pub use reconcile::{BulkDeleteReport, DeleteTarget, PurgeReport, ReconciliationService, SweepReport};
pub use scheduler::JobScheduler;
