//! Row extraction for envelope-shaped mirrors.
//!
//! Each module may register the dotted path of its record container
//! (`primary_record_path`, e.g. `data.items`). Without a registered path, or
//! when the registered path is absent from the document, the well-known
//! containers are searched and a warning is logged.

use std::collections::BTreeMap;

use rv_config::ModuleConfig;
use serde_json::Value;
use tracing::warn;

/// Containers searched under `data` and `data.data`.
pub const ROW_KEYS: &[&str] = &["items", "signals", "trades", "quotes", "metrics", "rows", "picks"];

/// Fallback containers that only appear in a few feeds.
const EXTRA_PATHS: &[&str] = &[
    "data.picks.top",
    "data.stocks.volumeLeaders",
    "data.stocks.gainers",
    "data.data.stocks.volumeLeaders",
    "data.data.stocks.gainers",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowSource {
    Primary(String),
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowCount {
    pub rows: usize,
    pub source: RowSource,
}

/// Resolve a dotted path (`data.items`) against a document.
pub fn lookup<'a>(doc: &'a Value, dotted: &str) -> Option<&'a Value> {
    dotted
        .split('.')
        .filter(|s| !s.is_empty())
        .try_fold(doc, |node, key| node.get(key))
}

fn container_len(v: &Value) -> Option<usize> {
    match v {
        Value::Array(a) => Some(a.len()),
        Value::Object(m) => Some(m.len()),
        _ => None,
    }
}

fn array_len(doc: &Value, dotted: &str) -> usize {
    match lookup(doc, dotted) {
        Some(Value::Array(a)) => a.len(),
        _ => 0,
    }
}

/// Sum over every known container. `data` itself counts when it is an array.
pub fn fallback_rows(doc: &Value) -> usize {
    if let Some(Value::Array(a)) = doc.get("data") {
        return a.len();
    }
    let mut n = 0;
    for key in ROW_KEYS {
        n += array_len(doc, &format!("data.{key}"));
        n += array_len(doc, &format!("data.data.{key}"));
    }
    n + EXTRA_PATHS.iter().map(|p| array_len(doc, p)).sum::<usize>()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowRegistry {
    paths: BTreeMap<String, String>,
}

impl RowRegistry {
    pub fn from_modules(modules: &[ModuleConfig]) -> Self {
        let paths = modules
            .iter()
            .filter_map(|m| m.primary_record_path.clone().map(|p| (m.id.clone(), p)))
            .collect();
        Self { paths }
    }

    pub fn with(mut self, module: impl Into<String>, path: impl Into<String>) -> Self {
        self.paths.insert(module.into(), path.into());
        self
    }

    pub fn primary(&self, module: &str) -> Option<&str> {
        self.paths.get(module).map(String::as_str)
    }

    pub fn count_rows(&self, module: &str, doc: &Value) -> RowCount {
        if let Some(path) = self.primary(module) {
            if let Some(n) = lookup(doc, path).and_then(container_len) {
                return RowCount {
                    rows: n,
                    source: RowSource::Primary(path.to_string()),
                };
            }
            warn!(module, path, "primary record path not found, probing known containers");
        } else {
            warn!(module, "no primary record path registered, probing known containers");
        }
        RowCount {
            rows: fallback_rows(doc),
            source: RowSource::Fallback,
        }
    }
}
