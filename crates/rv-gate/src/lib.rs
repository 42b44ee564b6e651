//! rv-gate
//!
//! Severity gate over the aggregated health report. Reason codes are
//! normalized and matched against the blocking/degrading sets of the
//! [`SeverityPolicy`]; a blocking hit or an overall `ERROR`/`CRITICAL`
//! status makes the pipeline "not green".

use std::collections::BTreeSet;
use std::io::Write;

use anyhow::Result;
use rv_artifacts::{get_json, layout, ArtifactStore, StoreRead};
use rv_config::SeverityPolicy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

pub const EXIT_GREEN: i32 = 0;
pub const EXIT_NOT_GREEN: i32 = 2;

/// Code attached to gate hits that do not come from a health reason.
pub const HEALTH_UNREADABLE: &str = "HEALTH_UNREADABLE";
pub const OVERALL_STATUS: &str = "OVERALL_STATUS";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HitSeverity {
    Blocking,
    Degrading,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateHit {
    pub code: String,
    pub message: String,
    pub severity: HitSeverity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateResult {
    pub pass: bool,
    pub hits: Vec<GateHit>,
}

impl GateResult {
    pub fn blocking(&self) -> impl Iterator<Item = &GateHit> {
        self.hits.iter().filter(|h| h.severity == HitSeverity::Blocking)
    }

    pub fn degrading(&self) -> impl Iterator<Item = &GateHit> {
        self.hits.iter().filter(|h| h.severity == HitSeverity::Degrading)
    }
}

/// `"universe:STALE_DATA"` -> `"STALE_DATA"`, `"x: live-but empty"` -> `"_LIVE_BUT_EMPTY"`.
/// Blank input has no code.
pub fn normalize_code(reason: &str) -> Option<String> {
    let raw = reason.trim();
    if raw.is_empty() {
        return None;
    }
    let tail = match raw.rfind(':') {
        Some(i) => &raw[i + 1..],
        None => raw,
    };
    Some(
        tail.chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
            .collect::<String>()
            .to_ascii_uppercase(),
    )
}

fn code_set(codes: &[String]) -> BTreeSet<String> {
    codes
        .iter()
        .map(|c| c.trim().to_ascii_uppercase())
        .filter(|c| !c.is_empty())
        .collect()
}

/// Classify `reasons` and the overall status. Codes in neither set count as degrading.
pub fn gate(reasons: &[String], policy: &SeverityPolicy, overall_status: &str) -> GateResult {
    let blocking = code_set(&policy.blocking_codes);
    let degrading = code_set(&policy.degrading_codes);

    let mut hits = Vec::new();
    for reason in reasons {
        let Some(code) = normalize_code(reason) else {
            continue;
        };
        let severity = if blocking.contains(&code) {
            HitSeverity::Blocking
        } else {
            if !degrading.contains(&code) {
                warn!(%code, "reason code not in severity policy, treated as degrading");
            }
            HitSeverity::Degrading
        };
        hits.push(GateHit {
            code,
            message: reason.clone(),
            severity,
        });
    }

    let overall = overall_status.trim().to_ascii_uppercase();
    if overall == "ERROR" || overall == "CRITICAL" {
        hits.push(GateHit {
            code: OVERALL_STATUS.to_string(),
            message: format!("overall status={overall}"),
            severity: HitSeverity::Blocking,
        });
    }

    let pass = !hits.iter().any(|h| h.severity == HitSeverity::Blocking);
    GateResult { pass, hits }
}

/// Gate `system/health.json`. A missing or unreadable report is a blocking hit.
pub fn gate_health(store: &dyn ArtifactStore, policy: &SeverityPolicy) -> Result<GateResult> {
    let health = match get_json::<Value>(store, layout::HEALTH_PATH)? {
        StoreRead::Parsed(v @ Value::Object(_)) => v,
        other => {
            let message = match other {
                StoreRead::Missing => format!("{} missing", layout::HEALTH_PATH),
                StoreRead::Corrupt(e) => format!("{} unparsable: {e}", layout::HEALTH_PATH),
                StoreRead::Parsed(_) => format!("{} is not an object", layout::HEALTH_PATH),
            };
            return Ok(GateResult {
                pass: false,
                hits: vec![GateHit {
                    code: HEALTH_UNREADABLE.to_string(),
                    message,
                    severity: HitSeverity::Blocking,
                }],
            });
        }
    };

    let reasons: Vec<String> = health
        .get("reasons")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();
    let status = health.get("status").and_then(Value::as_str).unwrap_or("");

    let result = gate(&reasons, policy, status);
    info!(
        pass = result.pass,
        blocking = result.blocking().count(),
        degrading = result.degrading().count(),
        "severity gate evaluated"
    );
    Ok(result)
}

/// Render a gate result and return the exit code.
///
/// Green: one `OK:` line on `out`, exit 0. Not green: one `NOT GREEN:` line
/// per blocking hit on `err`; strict exits [`EXIT_NOT_GREEN`], non-strict adds
/// a `WARN:` line and exits 0. Degrading hits are listed as `DEGRADED:` on `err`.
pub fn emit_gate<O: Write, E: Write>(
    result: &GateResult,
    strict: bool,
    out: &mut O,
    err: &mut E,
) -> std::io::Result<i32> {
    for h in result.degrading() {
        writeln!(err, "DEGRADED: {}: {}", h.code, h.message)?;
    }
    if result.pass {
        writeln!(
            out,
            "OK: severity gate green ({} degrading)",
            result.degrading().count()
        )?;
        return Ok(EXIT_GREEN);
    }
    for h in result.blocking() {
        writeln!(err, "NOT GREEN: {}: {}", h.code, h.message)?;
    }
    if strict {
        Ok(EXIT_NOT_GREEN)
    } else {
        writeln!(err, "WARN: severity gate not green (non-strict, exiting 0)")?;
        Ok(EXIT_GREEN)
    }
}
