//! Canonical response envelope.
//!
//! Every artifact and every API payload passes through [`normalize`] so the
//! wire format is identical module to module:
//!
//! ```text
//! { ok, feature, meta: { status, reason, generatedAt, schemaVersion, traceId, .. }, data, error }
//! ```
//!
//! Invariants enforced here:
//! - `ok == error.is_none()`
//! - `meta.status` is one of [`MetaStatus`]; anything else becomes `ERROR`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::SCHEMA_VERSION;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetaStatus {
    Live,
    StaleOk,
    MirrorFallback,
    NoData,
    Disabled,
    Error,
}

impl MetaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetaStatus::Live => "LIVE",
            MetaStatus::StaleOk => "STALE_OK",
            MetaStatus::MirrorFallback => "MIRROR_FALLBACK",
            MetaStatus::NoData => "NO_DATA",
            MetaStatus::Disabled => "DISABLED",
            MetaStatus::Error => "ERROR",
        }
    }

    /// Strict parse. Case-insensitive, surrounding whitespace ignored.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LIVE" => Some(MetaStatus::Live),
            "STALE_OK" => Some(MetaStatus::StaleOk),
            "MIRROR_FALLBACK" => Some(MetaStatus::MirrorFallback),
            "NO_DATA" => Some(MetaStatus::NoData),
            "DISABLED" => Some(MetaStatus::Disabled),
            "ERROR" => Some(MetaStatus::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub ok: bool,
    #[serde(alias = "module")]
    pub feature: String,
    pub meta: EnvelopeMeta,
    pub data: Option<Value>,
    pub error: Option<EnvelopeError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeMeta {
    pub status: MetaStatus,
    pub reason: Option<String>,
    pub generated_at: DateTime<Utc>,
    pub schema_version: String,
    pub trace_id: String,
    /// Producer-specific meta keys are carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeError {
    pub code: String,
    pub message: String,
    pub details: Option<Value>,
}

/// Loose producer input. Anything may be missing or mistyped; [`normalize`] repairs it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvelopeInput {
    #[serde(default)]
    pub ok: bool,
    #[serde(default, alias = "module")]
    pub feature: String,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub meta: Option<Value>,
}

const META_KNOWN_KEYS: &[&str] = &["status", "reason", "generatedAt", "schemaVersion", "traceId"];

/// Normalize producer output into the canonical [`Envelope`].
///
/// Pure: `now` supplies the default `generatedAt`; a missing `traceId` is
/// derived deterministically (UUIDv5) from feature + generatedAt.
pub fn normalize(input: EnvelopeInput, now: DateTime<Utc>) -> Envelope {
    let meta_obj = match input.meta {
        Some(Value::Object(m)) => m,
        _ => Map::new(),
    };

    let status = meta_obj
        .get("status")
        .and_then(Value::as_str)
        .and_then(MetaStatus::parse)
        .unwrap_or(MetaStatus::Error);

    let reason = meta_obj
        .get("reason")
        .and_then(Value::as_str)
        .map(str::to_string);

    let generated_at = meta_obj
        .get("generatedAt")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or(now);

    let schema_version = meta_obj
        .get("schemaVersion")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(SCHEMA_VERSION)
        .to_string();

    let trace_id = meta_obj
        .get("traceId")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| derive_trace_id(&input.feature, generated_at));

    let extra: Map<String, Value> = meta_obj
        .into_iter()
        .filter(|(k, _)| !META_KNOWN_KEYS.contains(&k.as_str()))
        .collect();

    let error = if input.ok {
        None
    } else {
        Some(coerce_error(input.error))
    };

    Envelope {
        ok: input.ok,
        feature: input.feature,
        meta: EnvelopeMeta {
            status,
            reason,
            generated_at,
            schema_version,
            trace_id,
            extra,
        },
        data: input.data,
        error,
    }
}

fn coerce_error(raw: Option<Value>) -> EnvelopeError {
    match raw {
        Some(Value::Object(m)) => EnvelopeError {
            code: m
                .get("code")
                .and_then(Value::as_str)
                .filter(|s| !s.trim().is_empty())
                .unwrap_or("UNKNOWN_ERROR")
                .to_string(),
            message: m
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
            details: m.get("details").cloned().filter(|d| !d.is_null()),
        },
        Some(Value::String(s)) => EnvelopeError {
            code: "UNKNOWN_ERROR".to_string(),
            message: s,
            details: None,
        },
        _ => EnvelopeError {
            code: "UNKNOWN_ERROR".to_string(),
            message: "unknown error".to_string(),
            details: None,
        },
    }
}

fn derive_trace_id(feature: &str, generated_at: DateTime<Utc>) -> String {
    let seed = format!("{}|{}", feature, generated_at.to_rfc3339());
    Uuid::new_v5(&Uuid::NAMESPACE_OID, seed.as_bytes()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        "2026-03-01T12:00:00Z".parse().unwrap()
    }

    #[test]
    fn ok_envelope_drops_error() {
        let env = normalize(
            EnvelopeInput {
                ok: true,
                feature: "fx".into(),
                data: Some(json!({"EURUSD": 1.08})),
                error: Some(json!({"code": "SHOULD_VANISH", "message": "x"})),
                meta: Some(json!({"status": "LIVE"})),
            },
            now(),
        );
        assert!(env.ok);
        assert!(env.error.is_none());
        assert_eq!(env.meta.status, MetaStatus::Live);
    }

    #[test]
    fn unknown_status_defaults_to_error() {
        let env = normalize(
            EnvelopeInput {
                ok: true,
                feature: "pulse".into(),
                meta: Some(json!({"status": "FRESH"})),
                ..Default::default()
            },
            now(),
        );
        assert_eq!(env.meta.status, MetaStatus::Error);
    }

    #[test]
    fn failed_envelope_gets_structured_error() {
        let env = normalize(
            EnvelopeInput {
                ok: false,
                feature: "news".into(),
                error: Some(json!("provider timed out")),
                ..Default::default()
            },
            now(),
        );
        let err = env.error.expect("error must be present when ok=false");
        assert_eq!(err.code, "UNKNOWN_ERROR");
        assert_eq!(err.message, "provider timed out");
    }

    #[test]
    fn defaults_are_filled_and_extra_meta_preserved() {
        let env = normalize(
            EnvelopeInput {
                ok: true,
                feature: "eod".into(),
                meta: Some(json!({"status": "no_data", "provider": "eodhd"})),
                ..Default::default()
            },
            now(),
        );
        assert_eq!(env.meta.status, MetaStatus::NoData);
        assert_eq!(env.meta.generated_at, now());
        assert_eq!(env.meta.schema_version, SCHEMA_VERSION);
        assert_eq!(env.meta.extra.get("provider"), Some(&json!("eodhd")));

        let again = normalize(
            EnvelopeInput {
                ok: true,
                feature: "eod".into(),
                meta: Some(json!({"status": "NO_DATA"})),
                ..Default::default()
            },
            now(),
        );
        assert_eq!(env.meta.trace_id, again.meta.trace_id);
    }

    #[test]
    fn wire_shape_uses_camel_case_meta() {
        let env = normalize(
            EnvelopeInput {
                ok: true,
                feature: "universe".into(),
                ..Default::default()
            },
            now(),
        );
        let v = serde_json::to_value(&env).unwrap();
        assert_eq!(v["feature"], "universe");
        assert!(v["meta"]["generatedAt"].is_string());
        assert!(v["meta"]["traceId"].is_string());
        assert!(v["error"].is_null());
    }
}
