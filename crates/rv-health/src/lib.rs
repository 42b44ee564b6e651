//! rv-health
//!
//! Derived views over the published tree: the system manifest, per-module
//! health with its daily history, and the semantic envelope check over
//! mirrors. Module artifacts are only read here.

mod aggregate;
mod envelope_check;
mod history;
mod rows;

pub use aggregate::{
    aggregate, assess_module, summarize, write_aggregate, Aggregate, AggregateArgs, Assessment,
};
pub use envelope_check::{
    check_mirror, mirror_status, run_envelope_check, unwrap_payload, EnvelopeCheckArgs,
    EnvelopeIssue, EnvelopeReport, Severity, ENVELOPE_REPORT_SCHEMA,
};
pub use history::{upsert_history, HealthHistory, HistoryItem, HISTORY_DAYS};
pub use rows::{fallback_rows, lookup, RowCount, RowRegistry, RowSource, ROW_KEYS};
