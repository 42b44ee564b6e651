use anyhow::{Context, Result};
use rv_schemas::ErrorCode;
use serde_json::Value;

use crate::validator::validate;
use crate::verdict::{Verdict, Violation};

/// Artifact kinds with a built-in schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Snapshot,
    ModuleState,
    CollectionManifest,
    Manifest,
    Health,
    Envelope,
    EodRow,
    Fx,
    Pulse,
    News,
    Fundamentals,
    Universe,
    MarketScore,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 13] = [
        ArtifactKind::Snapshot,
        ArtifactKind::ModuleState,
        ArtifactKind::CollectionManifest,
        ArtifactKind::Manifest,
        ArtifactKind::Health,
        ArtifactKind::Envelope,
        ArtifactKind::EodRow,
        ArtifactKind::Fx,
        ArtifactKind::Pulse,
        ArtifactKind::News,
        ArtifactKind::Fundamentals,
        ArtifactKind::Universe,
        ArtifactKind::MarketScore,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Snapshot => "snapshot",
            ArtifactKind::ModuleState => "module-state",
            ArtifactKind::CollectionManifest => "collection-manifest",
            ArtifactKind::Manifest => "manifest",
            ArtifactKind::Health => "health",
            ArtifactKind::Envelope => "envelope",
            ArtifactKind::EodRow => "eod-row",
            ArtifactKind::Fx => "fx",
            ArtifactKind::Pulse => "pulse",
            ArtifactKind::News => "news",
            ArtifactKind::Fundamentals => "fundamentals",
            ArtifactKind::Universe => "universe",
            ArtifactKind::MarketScore => "market-score",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s.trim())
    }

    fn schema_text(&self) -> &'static str {
        match self {
            ArtifactKind::Snapshot => include_str!("../schemas/snapshot.schema.json"),
            ArtifactKind::ModuleState => include_str!("../schemas/module-state.schema.json"),
            ArtifactKind::CollectionManifest => {
                include_str!("../schemas/collection-manifest.schema.json")
            }
            ArtifactKind::Manifest => include_str!("../schemas/manifest.schema.json"),
            ArtifactKind::Health => include_str!("../schemas/health.schema.json"),
            ArtifactKind::Envelope => include_str!("../schemas/envelope.schema.json"),
            ArtifactKind::EodRow => include_str!("../schemas/eod-row.schema.json"),
            ArtifactKind::Fx => include_str!("../schemas/fx.schema.json"),
            ArtifactKind::Pulse => include_str!("../schemas/pulse.schema.json"),
            ArtifactKind::News => include_str!("../schemas/news.schema.json"),
            ArtifactKind::Fundamentals => include_str!("../schemas/fundamentals.schema.json"),
            ArtifactKind::Universe => include_str!("../schemas/universe.schema.json"),
            ArtifactKind::MarketScore => include_str!("../schemas/market-score.schema.json"),
        }
    }

    pub fn schema(&self) -> Result<Value> {
        serde_json::from_str(self.schema_text())
            .with_context(|| format!("built-in schema for {} is not valid json", self.as_str()))
    }
}

/// Validate `doc` against the built-in schema for `kind`, plus the checks a
/// schema cannot express.
pub fn validate_kind(kind: ArtifactKind, doc: &Value) -> Result<Verdict> {
    let verdict = validate(&kind.schema()?, doc)?;
    Ok(match kind {
        ArtifactKind::MarketScore => verdict.merge(score_keys_match(doc)),
        _ => verdict,
    })
}

/// Each market-score entry is keyed by its own symbol.
fn score_keys_match(doc: &Value) -> Verdict {
    let Some(map) = doc.get("data").and_then(Value::as_object) else {
        return Verdict::Valid;
    };
    let out = map
        .iter()
        .filter_map(|(key, entry)| {
            let symbol = entry.get("symbol").and_then(Value::as_str)?;
            (symbol != key).then(|| {
                Violation::new(
                    ErrorCode::SchemaViolation,
                    format!("/data/{key}/symbol"),
                    format!("entry symbol {symbol} does not match key {key}"),
                )
            })
        })
        .collect();
    Verdict::from_violations(out)
}
