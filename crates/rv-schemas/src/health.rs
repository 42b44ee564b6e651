use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ErrorCode, Tier};

/// Per-module derived status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Ok,
    Stale,
    Stub,
    Error,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Ok => "OK",
            HealthStatus::Stale => "STALE",
            HealthStatus::Stub => "STUB",
            HealthStatus::Error => "ERROR",
        }
    }
}

/// Roll-up over all modules. `Error` is reserved for failures of required
/// (non-optional) modules or any critical-tier module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OverallStatus {
    Ok,
    Degraded,
    Error,
}

impl OverallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverallStatus::Ok => "OK",
            OverallStatus::Degraded => "DEGRADED",
            OverallStatus::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub file: String,
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(rename = "staleAfterMinutes")]
    pub stale_after_minutes: u64,
    #[serde(rename = "errorMessage")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthEntry {
    pub id: String,
    pub tier: Tier,
    pub optional: bool,
    pub status: HealthStatus,
    pub updated_at: Option<DateTime<Utc>>,
    pub age_minutes: Option<i64>,
    pub reason_code: Option<ErrorCode>,
    pub evidence: Evidence,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSummary {
    pub modules_total: usize,
    pub ok: usize,
    pub stale: usize,
    pub stub: usize,
    pub error: usize,
    pub critical_ok: bool,
}

/// `system/health.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    pub status: OverallStatus,
    /// Reason codes of every non-OK module, `"<module>:<CODE>"`.
    pub reasons: Vec<String>,
    pub summary: HealthSummary,
    pub modules: Vec<HealthEntry>,
    /// Housekeeping stamps (retention, ...) written by other passes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<Value>,
}

/// One row per module in the aggregated manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub id: String,
    pub path: String,
    pub schema_version: String,
    pub optional: bool,
    pub generated_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// `system/manifest.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    pub modules: Vec<ManifestEntry>,
}

/// A published file reference with its whole-file hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub path: String,
    pub sha256: String,
    pub bytes: u64,
}

/// `<domain>/<module>/manifest.json`: the files of one module collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionManifest {
    pub schema_version: String,
    pub module: String,
    pub run_id: String,
    pub generated_at: DateTime<Utc>,
    pub artifacts: Vec<ArtifactRef>,
}
