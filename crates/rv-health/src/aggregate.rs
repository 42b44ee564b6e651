//! Manifest / health aggregation over published snapshots.
//!
//! Read-only over module artifacts; the only writes are the derived
//! `system/*.json` documents in [`write_aggregate`].

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use rv_artifacts::{get_json, layout, put_json, ArtifactStore, StoreRead};
use rv_config::ModuleConfig;
use rv_contract::{pair_agreement, snapshot_invariants, validate_kind, ArtifactKind};
use rv_schemas::{
    ErrorCode, Evidence, HealthEntry, HealthReport, HealthStatus, HealthSummary, Manifest,
    ManifestEntry, OverallStatus, Tier,
};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::history::{upsert_history, HealthHistory};

pub struct AggregateArgs<'a> {
    pub store: &'a dyn ArtifactStore,
    pub modules: &'a [ModuleConfig],
    pub schema_version: &'a str,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub manifest: Manifest,
    pub health: HealthReport,
}

/// Outcome of looking at one module's published files.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub entry: HealthEntry,
    pub schema_version: Option<String>,
}

fn timestamp(doc: &Value, pointer: &str) -> Option<DateTime<Utc>> {
    doc.pointer(pointer)
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

fn updated_at(doc: &Value) -> Option<DateTime<Utc>> {
    timestamp(doc, "/metadata/published_at").or_else(|| timestamp(doc, "/meta/generatedAt"))
}

/// Classify one module. Checks run in order and the first hit decides:
/// missing, unparsable, stub, placeholder, contract violation, stale, ok.
pub fn assess_module(
    store: &dyn ArtifactStore,
    module: &ModuleConfig,
    now: DateTime<Utc>,
) -> Result<Assessment> {
    let file = layout::snapshot_path(&module.domain, &module.id);
    let entry = |status, updated: Option<DateTime<Utc>>, code: Option<ErrorCode>, msg: Option<String>| {
        HealthEntry {
            id: module.id.clone(),
            tier: module.tier,
            optional: module.optional,
            status,
            updated_at: updated,
            age_minutes: updated.map(|t| (now - t).num_minutes()),
            reason_code: code,
            evidence: Evidence {
                file: file.clone(),
                updated_at: updated,
                stale_after_minutes: module.stale_after_minutes,
                error_message: msg,
            },
        }
    };

    let doc = match get_json::<Value>(store, &file)? {
        StoreRead::Missing => {
            return Ok(Assessment {
                entry: entry(
                    HealthStatus::Error,
                    None,
                    Some(ErrorCode::MirrorMissing),
                    Some(format!("{file} not found")),
                ),
                schema_version: None,
            })
        }
        StoreRead::Corrupt(e) => {
            return Ok(Assessment {
                entry: entry(HealthStatus::Error, None, Some(ErrorCode::JsonParseError), Some(e)),
                schema_version: None,
            })
        }
        StoreRead::Parsed(doc) => doc,
    };

    let updated = updated_at(&doc);
    let schema_version = doc
        .get("schema_version")
        .and_then(Value::as_str)
        .map(str::to_string);
    let status = doc
        .pointer("/meta/status")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_ascii_uppercase());

    let e = if status.as_deref() == Some("STUB") {
        entry(HealthStatus::Stub, updated, Some(ErrorCode::MirrorMissing), None)
    } else if let Some(err) = doc.get("error").filter(|v| !v.is_null()) {
        let code = err
            .get("code")
            .and_then(Value::as_str)
            .map(ErrorCode::parse)
            .unwrap_or(ErrorCode::SnapshotMissing);
        let reason = doc.pointer("/meta/reason").and_then(Value::as_str);
        let code = ErrorCode::placeholder_cause(reason, &code);
        let msg = err.get("message").and_then(Value::as_str).map(str::to_string);
        entry(HealthStatus::Error, updated, Some(code), msg)
    } else if let Some(v) = contract_violation(store, module, &doc)? {
        entry(HealthStatus::Error, updated, Some(v.0), Some(v.1))
    } else {
        match updated {
            None => entry(
                HealthStatus::Stale,
                None,
                Some(ErrorCode::StaleData),
                Some("no publish timestamp".to_string()),
            ),
            Some(t) if (now - t).num_minutes() > module.stale_after_minutes as i64 => {
                entry(HealthStatus::Stale, Some(t), Some(ErrorCode::StaleData), None)
            }
            Some(t) => entry(HealthStatus::Ok, Some(t), None, None),
        }
    };

    Ok(Assessment {
        entry: e,
        schema_version,
    })
}

/// First contract violation of the published pair, if any.
fn contract_violation(
    store: &dyn ArtifactStore,
    module: &ModuleConfig,
    snapshot: &Value,
) -> Result<Option<(ErrorCode, String)>> {
    let mut violations = snapshot_invariants(snapshot)?;
    let state_rel = layout::module_state_path(&module.domain, &module.id);
    match get_json::<Value>(store, &state_rel)? {
        StoreRead::Parsed(state) => violations.extend(pair_agreement(snapshot, &state)),
        StoreRead::Missing => {
            return Ok(Some((ErrorCode::MirrorMissing, format!("{state_rel} not found"))))
        }
        StoreRead::Corrupt(e) => return Ok(Some((ErrorCode::JsonParseError, e))),
    }
    Ok(violations.into_iter().next().map(|v| {
        let msg = v.to_string();
        (v.code, msg)
    }))
}

/// Roll entries up into the summary, the overall status and the reason list.
///
/// Only an ERROR in a critical module makes the overall status ERROR; any
/// other module that is not OK degrades it.
pub fn summarize(entries: &[HealthEntry]) -> (OverallStatus, HealthSummary, Vec<String>) {
    let mut s = HealthSummary {
        modules_total: entries.len(),
        critical_ok: true,
        ..HealthSummary::default()
    };
    let mut reasons = Vec::new();

    for e in entries {
        match e.status {
            HealthStatus::Ok => s.ok += 1,
            HealthStatus::Stale => s.stale += 1,
            HealthStatus::Stub => s.stub += 1,
            HealthStatus::Error => {
                s.error += 1;
                if e.tier == Tier::Critical {
                    s.critical_ok = false;
                }
            }
        }
        if let Some(code) = &e.reason_code {
            reasons.push(format!("{}:{}", e.id, code));
        }
    }

    let overall = if !s.critical_ok {
        OverallStatus::Error
    } else if s.ok < s.modules_total {
        OverallStatus::Degraded
    } else {
        OverallStatus::Ok
    };
    (overall, s, reasons)
}

pub fn aggregate(args: AggregateArgs<'_>) -> Result<Aggregate> {
    let AggregateArgs {
        store,
        modules,
        schema_version,
        now,
    } = args;

    let mut sorted: Vec<&ModuleConfig> = modules.iter().collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));

    let mut entries = Vec::with_capacity(sorted.len());
    let mut manifest_rows = Vec::with_capacity(sorted.len());
    for m in sorted {
        let a = assess_module(store, m, now).with_context(|| format!("assess module {}", m.id))?;
        debug!(module = %m.id, status = a.entry.status.as_str(), "assessed");
        manifest_rows.push(ManifestEntry {
            id: m.id.clone(),
            path: a.entry.evidence.file.clone(),
            schema_version: a.schema_version.unwrap_or_else(|| schema_version.to_string()),
            optional: m.optional,
            generated_at: now,
            updated_at: a.entry.updated_at,
        });
        entries.push(a.entry);
    }

    let (status, summary, reasons) = summarize(&entries);
    Ok(Aggregate {
        manifest: Manifest {
            schema_version: schema_version.to_string(),
            generated_at: now,
            modules: manifest_rows,
        },
        health: HealthReport {
            schema_version: schema_version.to_string(),
            generated_at: now,
            status,
            reasons,
            summary,
            modules: entries,
            system: None,
        },
    })
}

fn ensure_valid(kind: ArtifactKind, doc: &Value) -> Result<()> {
    let verdict = validate_kind(kind, doc)?;
    if let Err(violations) = verdict.into_result() {
        let lines: Vec<String> = violations.iter().map(|v| v.to_string()).collect();
        bail!("{} failed its schema: {}", kind.as_str(), lines.join("; "));
    }
    Ok(())
}

/// Write manifest, health and history. The `system` block of an existing
/// health document is carried over.
pub fn write_aggregate(store: &dyn ArtifactStore, agg: &Aggregate) -> Result<()> {
    let mut health = agg.health.clone();
    if let StoreRead::Parsed(prev) = get_json::<HealthReport>(store, layout::HEALTH_PATH)? {
        health.system = prev.system;
    }

    let manifest_doc = serde_json::to_value(&agg.manifest).context("serialize manifest")?;
    let health_doc = serde_json::to_value(&health).context("serialize health")?;
    ensure_valid(ArtifactKind::Manifest, &manifest_doc)?;
    ensure_valid(ArtifactKind::Health, &health_doc)?;

    put_json(store, layout::MANIFEST_PATH, &manifest_doc)?;
    put_json(store, layout::HEALTH_PATH, &health_doc)?;

    let prev_history = match get_json::<HealthHistory>(store, layout::HEALTH_HISTORY_PATH)? {
        StoreRead::Parsed(h) => h,
        StoreRead::Missing => HealthHistory::empty(&health.schema_version),
        StoreRead::Corrupt(e) => {
            warn!(error = %e, "health history unreadable, starting a new one");
            HealthHistory::empty(&health.schema_version)
        }
    };
    put_json(store, layout::HEALTH_HISTORY_PATH, &upsert_history(prev_history, &health))?;

    info!(
        status = health.status.as_str(),
        ok = health.summary.ok,
        stale = health.summary.stale,
        error = health.summary.error,
        "health written"
    );
    Ok(())
}
