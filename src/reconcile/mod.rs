//! Reconciliation core.
//!
//! Pure planners (`differ`, `matcher`, `capacity`, `expansions`,
//! `recruitment`) plus the `engine` that drives them against a
//! `StateProvider` and reports through a `DiagnosticsSink`.
pub mod capacity;
pub mod differ;
pub mod engine;
pub mod events;
pub mod expansions;
pub mod matcher;
pub mod recruitment;
pub mod report;

pub use engine::{Reconciler, RunOptions};
pub use events::{DiagnosticsSink, Event};
pub use report::{FacilityReport, FailureSnapshot, PassOutcome, RunReport};
