//! The toggle write path and its building blocks.
//!
//! Each component works against a caller-owned `ProgressUnit` so several of
//! them can share one transaction.

mod aggregate;
mod enrollment;
mod reconciler;
mod service;
mod toggle;

pub use aggregate::{AggregateRecomputer, Recomputed};
pub use enrollment::EnrollmentService;
pub use reconciler::{ModuleReconciler, Reconciled};
pub use service::{ProgressService, ToggleOutcome, ToggleProgress};
pub use toggle::CompletionToggle;
