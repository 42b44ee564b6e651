//! Retention cleanup of mirrors and drift reports.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use rv_artifacts::{get_json, layout, put_json, FsStore, StoreRead};
use rv_config::RetentionConfig;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

pub const RETENTION_REPORT_SCHEMA: &str = "rv.retention.cleanup.v1";

/// Paths containing this are never deleted.
pub const PROTECTED_MARKER: &str = "last_good";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionMeta {
    pub schema: String,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub strategy: String,
    pub mirrors_retention_days: u64,
    pub ops_ledger_retention_days: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovedCounts {
    pub mirrors: usize,
    pub drift_reports: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionReport {
    pub meta: RetentionMeta,
    pub policy: RetentionPolicy,
    pub removed: RemovedCounts,
}

fn files_under(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e).with_context(|| format!("read_dir failed: {}", dir.display())),
    };
    for entry in entries {
        let entry = entry.with_context(|| format!("read_dir entry failed: {}", dir.display()))?;
        let path = entry.path();
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            files_under(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

/// Delete files under `dir` last modified before `now - max_age_days`.
pub fn remove_older_than(dir: &Path, max_age_days: u64, now: DateTime<Utc>) -> Result<usize> {
    let cutoff = now - Duration::days(max_age_days as i64);
    let mut files = Vec::new();
    files_under(dir, &mut files)?;

    let mut removed = 0;
    for f in files {
        if f.to_string_lossy().contains(PROTECTED_MARKER) {
            continue;
        }
        let Some(modified) = fs::metadata(&f).and_then(|m| m.modified()).ok() else {
            continue;
        };
        if DateTime::<Utc>::from(modified) < cutoff {
            match fs::remove_file(&f) {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %f.display(), error = %e, "retention delete failed"),
            }
        }
    }
    Ok(removed)
}

/// Run cleanup, write the report, and stamp `system.retention` into health.
pub fn run_retention(store: &FsStore, cfg: &RetentionConfig, now: DateTime<Utc>) -> Result<RetentionReport> {
    let mirrors = remove_older_than(&store.abs(&cfg.mirrors_dir)?, cfg.mirrors_retention_days, now)?;
    let drift = remove_older_than(&store.abs(&cfg.drift_dir)?, cfg.ops_ledger_retention_days, now)?;

    let report = RetentionReport {
        meta: RetentionMeta {
            schema: RETENTION_REPORT_SCHEMA.to_string(),
            generated_at: now,
        },
        policy: RetentionPolicy {
            strategy: cfg.strategy.clone(),
            mirrors_retention_days: cfg.mirrors_retention_days,
            ops_ledger_retention_days: cfg.ops_ledger_retention_days,
        },
        removed: RemovedCounts {
            mirrors,
            drift_reports: drift,
        },
    };
    put_json(store, layout::RETENTION_REPORT_PATH, &report)?;
    stamp_health(store, &cfg.strategy, now)?;

    info!(mirrors, drift, "retention cleanup done");
    Ok(report)
}

/// Merge `{strategy, last_cleanup}` into `system.retention` of health.json,
/// keeping every other key. A missing health document is created.
fn stamp_health(store: &FsStore, strategy: &str, now: DateTime<Utc>) -> Result<()> {
    let mut health = match get_json::<Value>(store, layout::HEALTH_PATH)? {
        StoreRead::Parsed(v @ Value::Object(_)) => v,
        StoreRead::Missing => {
            debug!("no health.json yet, not stamping retention");
            return Ok(());
        }
        StoreRead::Parsed(_) => {
            warn!("health.json is not an object, not stamping retention");
            return Ok(());
        }
        StoreRead::Corrupt(e) => {
            warn!(error = %e, "health.json unreadable, not stamping retention");
            return Ok(());
        }
    };
    let Some(root) = health.as_object_mut() else {
        return Ok(());
    };
    let system = root
        .entry("system")
        .or_insert_with(|| Value::Object(Map::new()));
    if !system.is_object() {
        *system = Value::Object(Map::new());
    }
    let retention = system
        .as_object_mut()
        .map(|s| s.entry("retention").or_insert_with(|| Value::Object(Map::new())));
    if let Some(Value::Object(r)) = retention {
        r.insert("strategy".into(), Value::String(strategy.to_string()));
        r.insert("last_cleanup".into(), json!(now));
    }
    put_json(store, layout::HEALTH_PATH, &health)
}
