//! Provider boundary.
//!
//! A provider is a black box that yields raw JSON records for one module.
//! Everything past this point (validation, counting, digesting, publishing)
//! lives in the producer.

use std::fmt;

use chrono::{DateTime, Utc};
use rv_schemas::ErrorCode;
use serde_json::Value;

// ---------------------------------------------------------------------------
// Raw payload
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct RawPayload {
    pub records: Vec<Value>,
    pub fetched_at: DateTime<Utc>,
}

impl RawPayload {
    pub fn new(records: Vec<Value>) -> Self {
        Self {
            records,
            fetched_at: Utc::now(),
        }
    }
}

/// Pull the record list out of a response body.
///
/// `pointer` (JSON pointer) selects the records node; without it the body
/// itself is used. An array yields its items; a single object yields one
/// record.
pub fn extract_records(body: Value, pointer: Option<&str>) -> Result<Vec<Value>, ProviderError> {
    let node = match pointer {
        Some(p) => body
            .pointer(p)
            .cloned()
            .ok_or_else(|| ProviderError::Decode(format!("records pointer {p} not found in response")))?,
        None => body,
    };
    match node {
        Value::Array(items) => Ok(items),
        Value::Object(_) => Ok(vec![node]),
        Value::Null => Ok(Vec::new()),
        other => Err(ProviderError::Decode(format!(
            "records node must be an array or object, got {other}"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// Network or transport failure.
    Transport(String),
    /// Upstream rejected the credentials (HTTP 401/403).
    Auth { status: u16 },
    /// Non-success HTTP status other than auth.
    Http { status: u16, message: String },
    /// No response within the configured timeout.
    Timeout { after_ms: u64 },
    /// Response payload could not be decoded.
    Decode(String),
    /// The env var naming the API key is unset or blank.
    MissingSecret { var: String },
    /// Request cap reached; no request was sent.
    BudgetExhausted { budget: String, window: &'static str },
    /// Upstream module has no usable published data.
    Upstream(String),
}

impl ProviderError {
    /// Provider class. Recorded as the placeholder's `meta.reason`; the
    /// placeholder's own `error.code` stays `SNAPSHOT_MISSING`.
    pub fn code(&self) -> ErrorCode {
        match self {
            ProviderError::Auth { .. } => ErrorCode::AuthFailed,
            ProviderError::Timeout { .. } => ErrorCode::UpstreamTimeout,
            ProviderError::MissingSecret { .. } => ErrorCode::MissingSecret,
            ProviderError::BudgetExhausted { .. } => ErrorCode::BudgetExhausted,
            ProviderError::Transport(_)
            | ProviderError::Http { .. }
            | ProviderError::Decode(_)
            | ProviderError::Upstream(_) => ErrorCode::SnapshotMissing,
        }
    }

    /// Auth, config and budget failures will not go away on a retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Transport(_) | ProviderError::Timeout { .. } => true,
            ProviderError::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Transport(msg) => write!(f, "transport error: {msg}"),
            ProviderError::Auth { status } => write!(f, "auth rejected by upstream (http {status})"),
            ProviderError::Http { status, message } => write!(f, "http {status}: {message}"),
            ProviderError::Timeout { after_ms } => write!(f, "no response after {after_ms} ms"),
            ProviderError::Decode(msg) => write!(f, "decode error: {msg}"),
            ProviderError::MissingSecret { var } => {
                write!(f, "env var '{var}' is not set or empty")
            }
            ProviderError::BudgetExhausted { budget, window } => {
                write!(f, "request budget '{budget}' exhausted for the current {window}")
            }
            ProviderError::Upstream(msg) => write!(f, "upstream unavailable: {msg}"),
        }
    }
}

impl std::error::Error for ProviderError {}

// ---------------------------------------------------------------------------
// Provider trait
// ---------------------------------------------------------------------------

/// Object-safe so the pipeline can hold `Box<dyn Provider>` per module.
#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    fn source_name(&self) -> &str;

    async fn fetch(&self) -> Result<RawPayload, ProviderError>;
}

/// Fixed records, for config-defined reference data and tests.
#[derive(Debug, Clone)]
pub struct StaticProvider {
    source: String,
    records: Vec<Value>,
}

impl StaticProvider {
    pub fn new(source: impl Into<String>, records: Vec<Value>) -> Self {
        Self {
            source: source.into(),
            records,
        }
    }
}

#[async_trait::async_trait]
impl Provider for StaticProvider {
    fn source_name(&self) -> &str {
        &self.source
    }

    async fn fetch(&self) -> Result<RawPayload, ProviderError> {
        Ok(RawPayload::new(self.records.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extract_by_pointer_and_fallbacks() {
        let body = json!({"data": {"items": [{"s": "A"}, {"s": "B"}]}});
        assert_eq!(extract_records(body.clone(), Some("/data/items")).unwrap().len(), 2);
        assert_eq!(extract_records(body.clone(), None).unwrap().len(), 1);
        assert!(matches!(
            extract_records(body, Some("/data/rows")),
            Err(ProviderError::Decode(_))
        ));
        assert!(extract_records(json!(null), None).unwrap().is_empty());
        assert!(extract_records(json!(42), None).is_err());
    }

    #[test]
    fn error_classes_map_to_codes() {
        assert_eq!(ProviderError::Auth { status: 401 }.code(), ErrorCode::AuthFailed);
        assert_eq!(ProviderError::Timeout { after_ms: 6000 }.code(), ErrorCode::UpstreamTimeout);
        assert_eq!(
            ProviderError::Http { status: 500, message: "x".into() }.code(),
            ErrorCode::SnapshotMissing
        );
        assert!(ProviderError::Http { status: 503, message: "x".into() }.is_retryable());
        assert!(!ProviderError::Auth { status: 403 }.is_retryable());
    }

    #[tokio::test]
    async fn static_provider_returns_records() {
        let p = StaticProvider::new("fixture", vec![json!({"a": 1})]);
        let payload = p.fetch().await.unwrap();
        assert_eq!(payload.records, vec![json!({"a": 1})]);
        assert_eq!(p.source_name(), "fixture");
    }
}
