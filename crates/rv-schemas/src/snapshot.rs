use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ErrorCode, MetaStatus};

/// Module tier. Drives publish policy: an ERROR in a critical module fails the run.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Critical,
    #[default]
    Standard,
    Experimental,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Critical => "critical",
            Tier::Standard => "standard",
            Tier::Experimental => "experimental",
        }
    }
}

/// Payload artifact for one module at one point in time.
///
/// `data` is either an array of records or a map keyed by symbol/id.
/// When `error` is set, `data` is `None` and `metadata.validation.passed` is false.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub schema_version: String,
    pub module: String,
    pub meta: SnapshotMeta,
    pub metadata: SnapshotMetadata,
    pub data: Option<Value>,
    pub error: Option<SnapshotError>,
}

/// Consumer-facing status, the same vocabulary the envelope uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub status: MetaStatus,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub module: String,
    pub tier: Tier,
    pub domain: String,
    pub source: String,
    pub fetched_at: DateTime<Utc>,
    pub published_at: DateTime<Utc>,
    pub digest: String,
    pub record_count: u64,
    pub validation: SnapshotValidation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotValidation {
    pub passed: bool,
    pub dropped_records: u64,
    pub drop_ratio: f64,
    pub drop_check_passed: bool,
    pub checks: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotError {
    pub code: ErrorCode,
    pub message: String,
}

impl Snapshot {
    pub fn is_placeholder(&self) -> bool {
        self.error.is_some()
    }

    /// Provider class behind a placeholder; `None` when data is present.
    pub fn placeholder_cause(&self) -> Option<ErrorCode> {
        let err = self.error.as_ref()?;
        Some(ErrorCode::placeholder_cause(self.meta.reason.as_deref(), &err.code))
    }

    /// Cardinality of `data`: array length, map size, 0 for null or scalars.
    pub fn data_cardinality(&self) -> u64 {
        match &self.data {
            Some(Value::Array(a)) => a.len() as u64,
            Some(Value::Object(m)) => m.len() as u64,
            _ => 0,
        }
    }
}

/// Lightweight companion of a [`Snapshot`]. Always written together with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleState {
    pub schema_version: String,
    pub module: String,
    pub digest: String,
    pub record_count: u64,
    pub published_at: DateTime<Utc>,
    pub validation: StateValidation,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateValidation {
    pub passed: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ModuleState {
    /// True when digest and record_count agree with `snapshot.metadata`.
    pub fn agrees_with(&self, snapshot: &Snapshot) -> bool {
        self.module == snapshot.module
            && self.digest == snapshot.metadata.digest
            && self.record_count == snapshot.metadata.record_count
    }
}
