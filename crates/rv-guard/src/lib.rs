//! rv-guard
//!
//! Housekeeping passes over the on-disk artifact tree: the orphan scan/guard
//! (toxic leftovers, dangling publish intents) and retention cleanup.

mod orphan;
mod retention;

pub use orphan::{
    is_toxic_dir, run_orphan_guard, DanglingIntent, GuardMode, Orphan, OrphanKind, OrphanReport,
    ORPHAN_REPORT_SCHEMA,
};
pub use retention::{
    remove_older_than, run_retention, RemovedCounts, RetentionReport, PROTECTED_MARKER,
    RETENTION_REPORT_SCHEMA,
};
