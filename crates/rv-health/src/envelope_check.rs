//! Semantic validation of envelope-shaped mirrors.
//!
//! A mirror can be schema-valid and still contradict itself: `LIVE` with no
//! rows is critical, `EMPTY`/`PARTIAL`/`NO_DATA` with rows is a warning.

use anyhow::Result;
use chrono::{DateTime, Utc};
use rv_artifacts::{atomic::TMP_MARKER, layout, put_json, ArtifactStore};
use rv_schemas::ErrorCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::rows::RowRegistry;

pub const ENVELOPE_REPORT_SCHEMA: &str = "rv_mirror_envelope_report_v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeIssue {
    pub severity: Severity,
    pub file: String,
    pub problem: ErrorCode,
    pub status: Option<String>,
    pub items_count: Option<usize>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeReport {
    pub schema: String,
    pub generated_at: DateTime<Utc>,
    pub strict: bool,
    pub max_critical: usize,
    pub total_mirrors: usize,
    pub failures_count: usize,
    pub warnings_count: usize,
    pub failures: Vec<EnvelopeIssue>,
    pub warnings: Vec<EnvelopeIssue>,
}

impl EnvelopeReport {
    /// Failures only fail the check in strict mode, and only above the allowance.
    pub fn passes(&self) -> bool {
        !self.strict || self.failures_count <= self.max_critical
    }
}

/// `payload` / `raw` wrappers are unwrapped to the envelope inside.
pub fn unwrap_payload(mirror: &Value) -> &Value {
    ["payload", "raw"]
        .iter()
        .find_map(|k| mirror.get(*k).filter(|v| v.is_object()))
        .unwrap_or(mirror)
}

fn status_at(doc: &Value, pointer: &str) -> Option<String> {
    doc.pointer(pointer)
        .and_then(Value::as_str)
        .map(|s| s.trim().to_ascii_uppercase())
        .filter(|s| !s.is_empty())
}

/// `dataQuality.status` (top level or under `data`), then `meta.status`.
pub fn mirror_status(payload: &Value) -> Option<String> {
    status_at(payload, "/dataQuality/status")
        .or_else(|| status_at(payload, "/data/dataQuality/status"))
        .or_else(|| status_at(payload, "/meta/status"))
}

fn module_of(file: &str) -> &str {
    let name = file.rsplit('/').next().unwrap_or(file);
    name.strip_suffix(".json").unwrap_or(name)
}

/// Check one mirror file. `None` means consistent.
pub fn check_mirror(file: &str, bytes: &[u8], registry: &RowRegistry) -> Option<EnvelopeIssue> {
    let mirror: Value = match serde_json::from_slice(bytes) {
        Ok(v) => v,
        Err(e) => {
            return Some(EnvelopeIssue {
                severity: Severity::Critical,
                file: file.to_string(),
                problem: ErrorCode::ParseError,
                status: None,
                items_count: None,
                error: Some(e.to_string()),
            })
        }
    };
    let payload = unwrap_payload(&mirror);
    let status = mirror_status(payload);
    let rows = registry.count_rows(module_of(file), payload).rows;

    let issue = |severity, problem| EnvelopeIssue {
        severity,
        file: file.to_string(),
        problem,
        status: status.clone(),
        items_count: Some(rows),
        error: None,
    };
    match status.as_deref() {
        Some("LIVE") if rows == 0 => Some(issue(Severity::Critical, ErrorCode::LiveButEmpty)),
        Some("EMPTY" | "PARTIAL" | "NO_DATA") if rows > 0 => {
            Some(issue(Severity::Warning, ErrorCode::NonLiveButHasData))
        }
        _ => None,
    }
}

pub struct EnvelopeCheckArgs<'a> {
    pub store: &'a dyn ArtifactStore,
    pub mirrors_dir: &'a str,
    pub registry: &'a RowRegistry,
    pub strict: bool,
    pub max_critical: usize,
    pub now: DateTime<Utc>,
}

/// Check every `*.json` under the mirrors dir and write the report.
pub fn run_envelope_check(args: EnvelopeCheckArgs<'_>) -> Result<EnvelopeReport> {
    let files: Vec<String> = args
        .store
        .list(args.mirrors_dir)?
        .into_iter()
        .filter(|f| f.ends_with(".json") && !f.contains(TMP_MARKER))
        .collect();

    let mut failures = Vec::new();
    let mut warnings = Vec::new();
    for file in &files {
        let Some(bytes) = args.store.get(file)? else { continue };
        match check_mirror(file, &bytes, args.registry) {
            Some(i) if i.severity == Severity::Critical => failures.push(i),
            Some(i) => warnings.push(i),
            None => {}
        }
    }

    let report = EnvelopeReport {
        schema: ENVELOPE_REPORT_SCHEMA.to_string(),
        generated_at: args.now,
        strict: args.strict,
        max_critical: args.max_critical,
        total_mirrors: files.len(),
        failures_count: failures.len(),
        warnings_count: warnings.len(),
        failures,
        warnings,
    };
    put_json(args.store, layout::MIRROR_ENVELOPE_REPORT_PATH, &report)?;
    info!(
        mirrors = report.total_mirrors,
        failures = report.failures_count,
        warnings = report.warnings_count,
        "envelope check done"
    );
    Ok(report)
}
