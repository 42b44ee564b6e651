//! Snapshot / module-state pair contract.
//!
//! A pair is valid when both documents pass their schemas, the snapshot is
//! internally consistent, its declared digest matches the recomputed digest of
//! `data`, and the module-state agrees on module, digest and record_count.

use anyhow::Result;
use rv_artifacts::digest_value;
use rv_schemas::ErrorCode;
use serde_json::Value;

use crate::kinds::{validate_kind, ArtifactKind};
use crate::verdict::{Verdict, Violation};

pub const SNAPSHOT_LABEL: &str = "snapshot";
pub const STATE_LABEL: &str = "module-state";

fn cardinality(data: &Value) -> u64 {
    match data {
        Value::Array(a) => a.len() as u64,
        Value::Object(m) => m.len() as u64,
        _ => 0,
    }
}

/// Invariants of a single snapshot that a schema cannot express.
pub fn snapshot_invariants(snapshot: &Value) -> Result<Vec<Violation>> {
    let mut out = Vec::new();
    let data = snapshot.get("data").unwrap_or(&Value::Null);
    let error = snapshot.get("error").unwrap_or(&Value::Null);
    let md = &snapshot["metadata"];

    if md["module"] != snapshot["module"] {
        out.push(Violation::new(
            ErrorCode::SchemaViolation,
            "/metadata/module",
            format!(
                "metadata names module {} but the snapshot is {}",
                md["module"], snapshot["module"]
            ),
        ));
    }

    if !error.is_null() {
        if !data.is_null() {
            out.push(Violation::new(
                ErrorCode::SchemaViolation,
                "/data",
                "error is set but data is not null",
            ));
        }
        if md["validation"]["passed"] != Value::Bool(false) {
            out.push(Violation::new(
                ErrorCode::SchemaViolation,
                "/metadata/validation/passed",
                "must be false when error is set",
            ));
        }
    } else if !data.is_null() {
        let n = cardinality(data);
        if let Some(declared) = md["record_count"].as_u64() {
            if declared != n {
                out.push(Violation::new(
                    ErrorCode::SchemaViolation,
                    "/metadata/record_count",
                    format!("record_count is {declared} but data holds {n} records"),
                ));
            }
        }
        if n == 0 && snapshot["meta"]["status"] == "LIVE" {
            out.push(Violation::new(
                ErrorCode::LiveButEmpty,
                "/data",
                "status LIVE with zero records",
            ));
        }
    }

    if let Some(declared) = md["digest"].as_str() {
        let actual = digest_value(data)?;
        if actual != declared {
            out.push(Violation::new(
                ErrorCode::DigestMismatch,
                "/metadata/digest",
                format!("declared {declared}, recomputed {actual}"),
            ));
        }
    }

    Ok(out.into_iter().map(|v| v.labelled(SNAPSHOT_LABEL)).collect())
}

/// Module-state fields that must mirror the snapshot.
pub fn pair_agreement(snapshot: &Value, state: &Value) -> Vec<Violation> {
    let mut out = Vec::new();
    let md = &snapshot["metadata"];

    let pairs = [
        ("/module", &snapshot["module"], &state["module"]),
        ("/digest", &md["digest"], &state["digest"]),
        ("/record_count", &md["record_count"], &state["record_count"]),
    ];
    for (path, expected, actual) in pairs {
        if expected != actual {
            out.push(
                Violation::new(
                    ErrorCode::DigestMismatch,
                    path,
                    format!("snapshot has {expected}, module-state has {actual}"),
                )
                .labelled(STATE_LABEL),
            );
        }
    }
    out
}

/// Full pair check. Accumulates every violation across both documents.
pub fn check_pair(snapshot: &Value, state: &Value) -> Result<Verdict> {
    let mut out: Vec<Violation> = validate_kind(ArtifactKind::Snapshot, snapshot)?
        .into_violations()
        .into_iter()
        .map(|v| v.labelled(SNAPSHOT_LABEL))
        .collect();
    out.extend(
        validate_kind(ArtifactKind::ModuleState, state)?
            .into_violations()
            .into_iter()
            .map(|v| v.labelled(STATE_LABEL)),
    );
    out.extend(snapshot_invariants(snapshot)?);
    out.extend(pair_agreement(snapshot, state));
    Ok(Verdict::from_violations(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pair(data: Value) -> (Value, Value) {
        let digest = digest_value(&data).unwrap();
        let n = cardinality(&data);
        let snapshot = json!({
            "schema_version": "3.0",
            "module": "fx",
            "meta": {"status": "LIVE", "reason": null},
            "metadata": {
                "module": "fx", "tier": "standard", "domain": "market", "source": "ecb",
                "fetched_at": "2026-03-01T12:00:00Z", "published_at": "2026-03-01T12:00:01Z",
                "digest": digest, "record_count": n,
                "validation": {
                    "passed": true, "dropped_records": 0, "drop_ratio": 0.0,
                    "drop_check_passed": true, "checks": [], "warnings": []
                }
            },
            "data": data,
            "error": null
        });
        let state = json!({
            "schema_version": "3.0",
            "module": "fx",
            "digest": digest,
            "record_count": n,
            "published_at": "2026-03-01T12:00:01Z",
            "validation": {"passed": true, "errors": [], "warnings": []}
        });
        (snapshot, state)
    }

    fn codes(v: &Verdict) -> Vec<&str> {
        v.violations().iter().map(|x| x.code.as_str()).collect()
    }

    #[test]
    fn matched_pair_is_valid() {
        let (s, m) = pair(json!({"EURUSD": 1.08, "GBPUSD": 1.27}));
        assert_eq!(check_pair(&s, &m).unwrap(), Verdict::Valid);
    }

    #[test]
    fn digest_and_count_disagreement_reported_together() {
        let (s, mut m) = pair(json!([1, 2, 3]));
        m["digest"] = json!(format!("sha256:{}", "0".repeat(64)));
        m["record_count"] = json!(2);
        let v = check_pair(&s, &m).unwrap();
        assert_eq!(codes(&v), vec!["DIGEST_MISMATCH", "DIGEST_MISMATCH"]);
        assert!(v.violations().iter().all(|x| x.path.starts_with("module-state:")));
    }

    #[test]
    fn tampered_data_fails_recomputed_digest() {
        let (mut s, m) = pair(json!([1, 2, 3]));
        s["data"] = json!([1, 2, 4]);
        let v = check_pair(&s, &m).unwrap();
        assert_eq!(codes(&v), vec!["DIGEST_MISMATCH"]);
        assert_eq!(v.violations()[0].path, "snapshot:/metadata/digest");
    }

    #[test]
    fn error_with_data_violates_invariant() {
        let (mut s, m) = pair(json!([1]));
        s["error"] = json!({"code": "SNAPSHOT_MISSING", "message": "x"});
        let v = check_pair(&s, &m).unwrap();
        let paths: Vec<_> = v.violations().iter().map(|x| x.path.as_str()).collect();
        assert!(paths.contains(&"snapshot:/data"));
        assert!(paths.contains(&"snapshot:/metadata/validation/passed"));
    }

    #[test]
    fn live_with_empty_data_is_flagged() {
        let (s, m) = pair(json!([]));
        let v = check_pair(&s, &m).unwrap();
        assert_eq!(codes(&v), vec!["LIVE_BUT_EMPTY"]);
    }

    #[test]
    fn metadata_module_must_name_the_snapshot_module() {
        let (mut s, m) = pair(json!([1]));
        s["metadata"]["module"] = json!("news");
        let v = check_pair(&s, &m).unwrap();
        assert_eq!(codes(&v), vec!["SCHEMA_VIOLATION"]);
        assert_eq!(v.violations()[0].path, "snapshot:/metadata/module");
    }

    #[test]
    fn schema_errors_are_labelled() {
        let (mut s, m) = pair(json!([1]));
        s["metadata"]
            .as_object_mut()
            .unwrap()
            .remove("source");
        let v = check_pair(&s, &m).unwrap();
        assert_eq!(v.violations()[0].path, "snapshot:/metadata/source");
        assert_eq!(v.violations()[0].code, ErrorCode::SchemaViolation);
    }
}
