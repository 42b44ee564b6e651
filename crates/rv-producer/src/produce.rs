//! Raw records -> matched snapshot / module-state pair.

use anyhow::Result;
use chrono::{DateTime, Utc};
use rv_artifacts::digest_value;
use rv_config::{DataShape, DropPolicy, ModuleConfig};
use rv_schemas::{
    ErrorCode, MetaStatus, ModuleState, Snapshot, SnapshotError, SnapshotMeta, SnapshotMetadata,
    SnapshotValidation, StateValidation,
};
use serde_json::{Map, Value};

/// Drop warnings beyond this many are summarized.
const MAX_DROP_WARNINGS: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct Produced {
    pub snapshot: Snapshot,
    pub state: ModuleState,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DropCheck {
    pub attempted: u64,
    pub dropped: u64,
    pub ratio: f64,
    /// `None` when no policy is configured.
    pub threshold: Option<f64>,
    pub passed: bool,
}

/// `dropped <= min(max_drop_abs, attempted * max_drop_ratio)`. Either bound
/// may be absent; with neither the check passes trivially.
pub fn evaluate_drop(policy: Option<&DropPolicy>, attempted: u64, dropped: u64) -> DropCheck {
    let ratio = if attempted > 0 {
        dropped as f64 / attempted as f64
    } else {
        0.0
    };
    let threshold = policy.and_then(|p| {
        let abs = p.max_drop_abs.map(|a| a as f64);
        let rel = p.max_drop_ratio.map(|r| attempted as f64 * r);
        match (abs, rel) {
            (Some(a), Some(r)) => Some(a.min(r)),
            (a, r) => a.or(r),
        }
    });
    DropCheck {
        attempted,
        dropped,
        ratio,
        threshold,
        passed: threshold.map(|t| dropped as f64 <= t).unwrap_or(true),
    }
}

/// Per-run inputs shared by every module.
#[derive(Debug, Clone, Copy)]
pub struct ProduceContext<'a> {
    pub schema_version: &'a str,
    pub drop_policy: Option<&'a DropPolicy>,
}

fn key_of(record: &Value, field: &str) -> Option<String> {
    match record.get(field)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Why a record is rejected, or `None` if it is kept.
fn reject_reason(record: &Value, required: &[String], key_field: Option<&str>) -> Option<String> {
    let Some(obj) = record.as_object() else {
        return Some("not an object".to_string());
    };
    if let Some(field) = required
        .iter()
        .find(|f| obj.get(f.as_str()).map(Value::is_null).unwrap_or(true))
    {
        return Some(format!("missing field {field}"));
    }
    if let Some(k) = key_field {
        if key_of(record, k).is_none() {
            return Some(format!("missing key field {k}"));
        }
    }
    None
}

/// Validate, shape, count and digest raw records into a matched pair.
///
/// Zero surviving records yield `NO_DATA`; LIVE always carries rows.
pub fn produce(
    module: &ModuleConfig,
    ctx: ProduceContext<'_>,
    records: Vec<Value>,
    fetched_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<Produced> {
    let attempted = records.len() as u64;
    let key_field = match &module.data_shape {
        DataShape::MapByKey(k) => Some(k.as_str()),
        DataShape::Array => None,
    };

    let mut warnings: Vec<String> = Vec::new();
    let mut dropped: u64 = 0;
    let mut kept: Vec<Value> = Vec::with_capacity(records.len());

    for (i, record) in records.into_iter().enumerate() {
        match reject_reason(&record, &module.record_schema, key_field) {
            None => kept.push(record),
            Some(reason) => {
                dropped += 1;
                if warnings.len() < MAX_DROP_WARNINGS {
                    warnings.push(format!("record {i} dropped: {reason}"));
                }
            }
        }
    }

    let data = match key_field {
        None => Value::Array(kept),
        Some(k) => {
            let mut map = Map::new();
            for record in kept {
                // reject_reason guarantees the key
                let Some(key) = key_of(&record, k) else { continue };
                if map.insert(key.clone(), record).is_some() {
                    dropped += 1;
                    if warnings.len() < MAX_DROP_WARNINGS {
                        warnings.push(format!("duplicate key {key}: later record kept"));
                    }
                }
            }
            Value::Object(map)
        }
    };
    if dropped as usize > MAX_DROP_WARNINGS {
        warnings.push(format!("{dropped} records dropped in total"));
    }

    let record_count = match &data {
        Value::Array(a) => a.len() as u64,
        Value::Object(m) => m.len() as u64,
        _ => 0,
    };
    let digest = digest_value(&data)?;
    let drop = evaluate_drop(ctx.drop_policy, attempted, dropped);

    let mut errors = Vec::new();
    if !drop.passed {
        errors.push(format!(
            "{}: dropped {} of {} records (threshold {:.2})",
            ErrorCode::DropThresholdExceeded,
            drop.dropped,
            drop.attempted,
            drop.threshold.unwrap_or(0.0)
        ));
    }

    let (status, reason) = if record_count > 0 {
        (MetaStatus::Live, None)
    } else {
        (MetaStatus::NoData, Some("NO_RECORDS".to_string()))
    };

    let mut checks = vec!["record_shape".to_string(), "digest".to_string()];
    if ctx.drop_policy.is_some() {
        checks.push("drop_threshold".to_string());
    }

    let snapshot = Snapshot {
        schema_version: ctx.schema_version.to_string(),
        module: module.id.clone(),
        meta: SnapshotMeta { status, reason },
        metadata: SnapshotMetadata {
            module: module.id.clone(),
            tier: module.tier,
            domain: module.domain.clone(),
            source: module.source.clone(),
            fetched_at,
            published_at: now,
            digest: digest.clone(),
            record_count,
            validation: SnapshotValidation {
                passed: drop.passed,
                dropped_records: dropped,
                drop_ratio: drop.ratio,
                drop_check_passed: drop.passed,
                checks,
                warnings: warnings.clone(),
            },
        },
        data: Some(data),
        error: None,
    };

    let state = ModuleState {
        schema_version: ctx.schema_version.to_string(),
        module: module.id.clone(),
        digest,
        record_count,
        published_at: now,
        validation: StateValidation {
            passed: drop.passed,
            errors,
            warnings,
        },
    };

    Ok(Produced { snapshot, state })
}

/// Pair written when the module could not obtain data. `data` is null and
/// the digest is that of `null`.
///
/// `error.code` is always `SNAPSHOT_MISSING`; `cause` (the provider class)
/// goes to `meta.reason` and prefixes the message.
pub fn placeholder(
    module: &ModuleConfig,
    ctx: ProduceContext<'_>,
    cause: ErrorCode,
    message: impl Into<String>,
    now: DateTime<Utc>,
) -> Result<Produced> {
    let code = ErrorCode::SnapshotMissing;
    let message = match message.into() {
        m if cause == code => m,
        m => format!("{cause}: {m}"),
    };
    let digest = digest_value(&Value::Null)?;

    let snapshot = Snapshot {
        schema_version: ctx.schema_version.to_string(),
        module: module.id.clone(),
        meta: SnapshotMeta {
            status: MetaStatus::Error,
            reason: Some(cause.as_str().to_string()),
        },
        metadata: SnapshotMetadata {
            module: module.id.clone(),
            tier: module.tier,
            domain: module.domain.clone(),
            source: module.source.clone(),
            fetched_at: now,
            published_at: now,
            digest: digest.clone(),
            record_count: 0,
            validation: SnapshotValidation {
                passed: false,
                dropped_records: 0,
                drop_ratio: 0.0,
                drop_check_passed: true,
                checks: vec![],
                warnings: vec![],
            },
        },
        data: None,
        error: Some(SnapshotError {
            code: code.clone(),
            message: message.clone(),
        }),
    };

    let state = ModuleState {
        schema_version: ctx.schema_version.to_string(),
        module: module.id.clone(),
        digest,
        record_count: 0,
        published_at: now,
        validation: StateValidation {
            passed: false,
            errors: vec![format!("{code}: {message}")],
            warnings: vec![],
        },
    };

    Ok(Produced { snapshot, state })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rv_config::ProviderConfig;
    use serde_json::json;

    fn module(shape: DataShape, required: &[&str]) -> ModuleConfig {
        ModuleConfig {
            id: "eod".into(),
            domain: "market".into(),
            tier: Default::default(),
            source: "eodhd".into(),
            stale_after_minutes: 1440,
            depends_on: vec![],
            optional: false,
            data_shape: shape,
            primary_record_path: None,
            record_schema: required.iter().map(|s| s.to_string()).collect(),
            provider: ProviderConfig::Static { records: json!([]) },
        }
    }

    fn ctx(policy: Option<&DropPolicy>) -> ProduceContext<'_> {
        ProduceContext {
            schema_version: "3.0",
            drop_policy: policy,
        }
    }

    fn now() -> DateTime<Utc> {
        "2026-03-02T21:30:00Z".parse().unwrap()
    }

    #[test]
    fn drop_threshold_takes_the_smaller_bound() {
        let p = DropPolicy {
            max_drop_abs: Some(5),
            max_drop_ratio: Some(0.001),
        };
        assert!(evaluate_drop(Some(&p), 10_000, 5).passed);
        assert!(!evaluate_drop(Some(&p), 10_000, 6).passed);
        assert!(evaluate_drop(Some(&p), 1000, 1).passed);
        assert!(!evaluate_drop(Some(&p), 1000, 2).passed);
        assert!(evaluate_drop(None, 10, 10).passed);
        assert_eq!(evaluate_drop(None, 0, 0).ratio, 0.0);

        let abs_only = DropPolicy {
            max_drop_abs: Some(1),
            max_drop_ratio: None,
        };
        assert!(!evaluate_drop(Some(&abs_only), 1_000_000, 2).passed);
    }

    #[test]
    fn pair_matches_and_counts() {
        let m = module(DataShape::Array, &["symbol", "close"]);
        let out = produce(
            &m,
            ctx(None),
            vec![
                json!({"symbol": "AAPL", "close": 1.0}),
                json!({"symbol": "MSFT", "close": null}),
                json!("garbage"),
            ],
            now(),
            now(),
        )
        .unwrap();

        assert!(out.state.agrees_with(&out.snapshot));
        assert_eq!(out.snapshot.metadata.record_count, 1);
        assert_eq!(out.snapshot.data_cardinality(), 1);
        assert_eq!(out.snapshot.metadata.validation.dropped_records, 2);
        assert!(out.snapshot.metadata.validation.passed);
        assert_eq!(out.snapshot.meta.status, MetaStatus::Live);
        assert_eq!(out.state.validation.warnings.len(), 2);
    }

    #[test]
    fn digest_is_idempotent_across_runs() {
        let m = module(DataShape::Array, &[]);
        let recs = vec![json!({"b": 2, "a": 1})];
        let a = produce(&m, ctx(None), recs.clone(), now(), now()).unwrap();
        let later: DateTime<Utc> = "2026-03-03T21:30:00Z".parse().unwrap();
        let b = produce(&m, ctx(None), vec![json!({"a": 1, "b": 2})], later, later).unwrap();
        assert_eq!(a.snapshot.metadata.digest, b.snapshot.metadata.digest);
    }

    #[test]
    fn map_shape_keys_records_and_counts_duplicates() {
        let m = module(DataShape::MapByKey("symbol".into()), &[]);
        let out = produce(
            &m,
            ctx(None),
            vec![
                json!({"symbol": "AAPL", "v": 1}),
                json!({"symbol": "AAPL", "v": 2}),
                json!({"v": 3}),
            ],
            now(),
            now(),
        )
        .unwrap();
        assert_eq!(out.snapshot.data, Some(json!({"AAPL": {"symbol": "AAPL", "v": 2}})));
        assert_eq!(out.snapshot.metadata.validation.dropped_records, 2);
    }

    #[test]
    fn zero_records_is_no_data_not_live() {
        let m = module(DataShape::Array, &[]);
        let out = produce(&m, ctx(None), vec![], now(), now()).unwrap();
        assert_eq!(out.snapshot.meta.status, MetaStatus::NoData);
        assert_eq!(out.snapshot.metadata.record_count, 0);
        assert!(out.snapshot.metadata.validation.passed);
    }

    #[test]
    fn exceeded_drop_threshold_fails_validation() {
        let p = DropPolicy {
            max_drop_abs: Some(0),
            max_drop_ratio: None,
        };
        let m = module(DataShape::Array, &["close"]);
        let out = produce(&m, ctx(Some(&p)), vec![json!({"close": 1}), json!({})], now(), now()).unwrap();
        let v = &out.snapshot.metadata.validation;
        assert!(!v.passed);
        assert!(!v.drop_check_passed);
        assert!(out.state.validation.errors[0].starts_with("DROP_THRESHOLD_EXCEEDED"));
    }

    #[test]
    fn placeholder_has_null_data_and_failed_validation() {
        let m = module(DataShape::Array, &[]);
        let out = placeholder(&m, ctx(None), ErrorCode::UpstreamTimeout, "no response", now()).unwrap();
        assert!(out.snapshot.data.is_none());
        assert!(!out.snapshot.metadata.validation.passed);
        assert_eq!(out.snapshot.meta.status, MetaStatus::Error);
        assert!(out.state.agrees_with(&out.snapshot));

        // the provider class never replaces the placeholder code
        let err = out.snapshot.error.as_ref().unwrap();
        assert_eq!(err.code, ErrorCode::SnapshotMissing);
        assert_eq!(err.message, "UPSTREAM_TIMEOUT: no response");
        assert_eq!(out.snapshot.meta.reason.as_deref(), Some("UPSTREAM_TIMEOUT"));
        assert_eq!(out.snapshot.placeholder_cause(), Some(ErrorCode::UpstreamTimeout));
        assert!(out.state.validation.errors[0].starts_with("SNAPSHOT_MISSING: UPSTREAM_TIMEOUT"));
    }
}
