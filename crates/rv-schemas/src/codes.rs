use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Error / reason taxonomy used across artifacts, reports and gate policies.
///
/// Serialized as the SCREAMING_SNAKE string (`"DIGEST_MISMATCH"`). Codes that
/// are not part of the taxonomy survive a round-trip through [`ErrorCode::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorCode {
    /// Document fails structural validation. Always fatal to that artifact.
    SchemaViolation,
    /// Paired snapshot / module-state (or recomputed digest) disagree.
    DigestMismatch,
    /// Producer could not obtain data; a placeholder artifact is in place.
    SnapshotMissing,
    /// Artifact unreadable.
    JsonParseError,
    /// Artifact well-formed but older than its TTL.
    StaleData,
    /// Declared LIVE with zero extractable rows.
    LiveButEmpty,
    /// Declared EMPTY/PARTIAL but rows are present.
    NonLiveButHasData,
    /// publish_intent without a matching publish_complete.
    OrphanDanglingIntent,
    /// Artifact file absent (or a stub).
    MirrorMissing,
    /// Mirror could not be parsed by the envelope validator.
    ParseError,
    MissingSecret,
    AuthFailed,
    UpstreamTimeout,
    BudgetExhausted,
    DropThresholdExceeded,
    Other(String),
}

impl ErrorCode {
    pub fn as_str(&self) -> &str {
        match self {
            ErrorCode::SchemaViolation => "SCHEMA_VIOLATION",
            ErrorCode::DigestMismatch => "DIGEST_MISMATCH",
            ErrorCode::SnapshotMissing => "SNAPSHOT_MISSING",
            ErrorCode::JsonParseError => "JSON_PARSE_ERROR",
            ErrorCode::StaleData => "STALE_DATA",
            ErrorCode::LiveButEmpty => "LIVE_BUT_EMPTY",
            ErrorCode::NonLiveButHasData => "NON_LIVE_BUT_HAS_DATA",
            ErrorCode::OrphanDanglingIntent => "ORPHAN_DANGLING_INTENT",
            ErrorCode::MirrorMissing => "MIRROR_MISSING",
            ErrorCode::ParseError => "PARSE_ERROR",
            ErrorCode::MissingSecret => "MISSING_SECRET",
            ErrorCode::AuthFailed => "AUTH_FAILED",
            ErrorCode::UpstreamTimeout => "UPSTREAM_TIMEOUT",
            ErrorCode::BudgetExhausted => "BUDGET_EXHAUSTED",
            ErrorCode::DropThresholdExceeded => "DROP_THRESHOLD_EXCEEDED",
            ErrorCode::Other(s) => s.as_str(),
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "SCHEMA_VIOLATION" => ErrorCode::SchemaViolation,
            "DIGEST_MISMATCH" => ErrorCode::DigestMismatch,
            "SNAPSHOT_MISSING" => ErrorCode::SnapshotMissing,
            "JSON_PARSE_ERROR" => ErrorCode::JsonParseError,
            "STALE_DATA" => ErrorCode::StaleData,
            "LIVE_BUT_EMPTY" => ErrorCode::LiveButEmpty,
            "NON_LIVE_BUT_HAS_DATA" => ErrorCode::NonLiveButHasData,
            "ORPHAN_DANGLING_INTENT" => ErrorCode::OrphanDanglingIntent,
            "MIRROR_MISSING" => ErrorCode::MirrorMissing,
            "PARSE_ERROR" => ErrorCode::ParseError,
            "MISSING_SECRET" => ErrorCode::MissingSecret,
            "AUTH_FAILED" => ErrorCode::AuthFailed,
            "UPSTREAM_TIMEOUT" => ErrorCode::UpstreamTimeout,
            "BUDGET_EXHAUSTED" => ErrorCode::BudgetExhausted,
            "DROP_THRESHOLD_EXCEEDED" => ErrorCode::DropThresholdExceeded,
            other => ErrorCode::Other(other.to_string()),
        }
    }

    /// What a placeholder stands in for. Placeholders always carry
    /// `SNAPSHOT_MISSING`; the provider class rides in `meta.reason` and wins
    /// when it names a taxonomy code.
    pub fn placeholder_cause(reason: Option<&str>, code: &ErrorCode) -> ErrorCode {
        match reason.map(ErrorCode::parse) {
            Some(c) if *code == ErrorCode::SnapshotMissing && !matches!(c, ErrorCode::Other(_)) => c,
            _ => code.clone(),
        }
    }

    /// Codes that always fail the artifact or the run they are attached to.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ErrorCode::SchemaViolation
                | ErrorCode::DigestMismatch
                | ErrorCode::LiveButEmpty
                | ErrorCode::OrphanDanglingIntent
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ErrorCode {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        Ok(ErrorCode::parse(&raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_round_trip_through_strings() {
        for code in [
            ErrorCode::SchemaViolation,
            ErrorCode::DigestMismatch,
            ErrorCode::LiveButEmpty,
            ErrorCode::OrphanDanglingIntent,
        ] {
            assert_eq!(ErrorCode::parse(code.as_str()), code);
        }
    }

    #[test]
    fn placeholder_cause_prefers_a_known_reason() {
        let missing = ErrorCode::SnapshotMissing;
        assert_eq!(
            ErrorCode::placeholder_cause(Some("AUTH_FAILED"), &missing),
            ErrorCode::AuthFailed
        );
        assert_eq!(ErrorCode::placeholder_cause(Some("weekend"), &missing), missing);
        assert_eq!(ErrorCode::placeholder_cause(None, &missing), missing);
        // a non-placeholder error code is never overridden
        assert_eq!(
            ErrorCode::placeholder_cause(Some("AUTH_FAILED"), &ErrorCode::DigestMismatch),
            ErrorCode::DigestMismatch
        );
    }

    #[test]
    fn unknown_code_is_preserved() {
        let c = ErrorCode::parse("PROVIDER_QUOTA");
        assert_eq!(c, ErrorCode::Other("PROVIDER_QUOTA".to_string()));
        assert_eq!(serde_json::to_string(&c).unwrap(), "\"PROVIDER_QUOTA\"");
    }
}
