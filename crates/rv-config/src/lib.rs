//! rv-config
//!
//! Layered YAML pipeline configuration.
//!
//! Docs are merged in order (later layers override), converted to JSON,
//! checked for literal secrets, canonicalized (recursive key sort) and hashed.
//! The hash identifies the exact configuration a run used.
//!
//! The typed view is [`PipelineConfig`]. Provider keys are stored as env-var
//! NAMES and resolved once through [`secrets`].

use std::collections::BTreeSet;
use std::fs;

use anyhow::{bail, Context, Result};
use rv_artifacts::{canonical_json, sha256_hex};
use serde::{Deserialize, Serialize};
use serde_json::Value;

mod pipeline;
pub mod secrets;

pub use pipeline::{
    BudgetConfig, DataShape, DropPolicy, FetchConfig, ModuleConfig, PipelineConfig,
    ProviderConfig, RetentionConfig, SeverityPolicy,
};
pub use secrets::{resolve_secret, resolve_secret_with, ResolvedSecrets, SecretError, SecretValue};

/// Leaf strings starting with one of these abort loading with CONFIG_SECRET_DETECTED.
const SECRET_PREFIXES: &[&str] = &[
    "sk-",
    "sk_live",
    "sk_test",
    "AKIA",
    "-----BEGIN",
    "ghp_",
    "gho_",
    "glpat-",
    "xoxb-",
    "xoxp-",
];

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

impl LoadedConfig {
    pub fn pipeline(&self) -> Result<PipelineConfig> {
        PipelineConfig::from_json(&self.config_json)
    }
}

pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut docs: Vec<String> = Vec::new();
    for p in paths {
        let raw =
            fs::read_to_string(p).with_context(|| format!("failed to read yaml path: {p}"))?;
        docs.push(raw);
    }
    let doc_refs: Vec<&str> = docs.iter().map(|s| s.as_str()).collect();
    load_layered_yaml_from_strings(&doc_refs)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = serde_json::json!({});
    for raw in yaml_docs {
        let v_yaml: serde_yaml::Value = serde_yaml::from_str(raw).context("invalid yaml")?;
        let v_json = serde_json::to_value(v_yaml).context("yaml->json conversion failed")?;
        merged = deep_merge(merged, v_json);
    }

    enforce_no_secret_literals(&merged)?;

    let canonical_json = canonical_json(&merged)?;
    let config_hash = sha256_hex(canonical_json.as_bytes());
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

/// Objects merge key by key; anything else (arrays included) is replaced.
fn deep_merge(a: Value, b: Value) -> Value {
    match (a, b) {
        (Value::Object(mut a_map), Value::Object(b_map)) => {
            for (k, b_val) in b_map {
                let a_val = a_map.remove(&k).unwrap_or(Value::Null);
                a_map.insert(k, deep_merge(a_val, b_val));
            }
            Value::Object(a_map)
        }
        (_, b_other) => b_other,
    }
}

fn enforce_no_secret_literals(v: &Value) -> Result<()> {
    let mut leaves = Vec::new();
    collect_leaf_pointers(v, "", &mut leaves);

    for ptr in leaves {
        if let Some(s) = v.pointer(&ptr).and_then(Value::as_str) {
            if looks_like_secret(s) {
                bail!("CONFIG_SECRET_DETECTED leaf={} value=REDACTED", ptr);
            }
        }
    }
    Ok(())
}

fn looks_like_secret(s: &str) -> bool {
    let t = s.trim();
    if t.len() < 8 {
        return false;
    }
    SECRET_PREFIXES.iter().any(|p| t.starts_with(p))
}

// ---------------------------------------------------------------------------
// Unused-key guard
// ---------------------------------------------------------------------------

/// JSON-pointer prefixes the pipeline actually reads. A leaf outside all of
/// them is a typo or a dead setting.
pub const CONSUMED_POINTERS: &[&str] = &[
    "/artifact_root",
    "/schema_version",
    "/fetch",
    "/drop_policy",
    "/modules",
    "/severity",
    "/retention",
    "/budgets",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnusedKeyPolicy {
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnusedKeyReport {
    pub unused_leaf_pointers: Vec<String>,
}

impl UnusedKeyReport {
    pub fn is_clean(&self) -> bool {
        self.unused_leaf_pointers.is_empty()
    }
}

pub fn report_unused_keys(config_json: &Value, policy: UnusedKeyPolicy) -> Result<UnusedKeyReport> {
    let mut leaves: Vec<String> = Vec::new();
    collect_leaf_pointers(config_json, "", &mut leaves);

    let unused: BTreeSet<String> = leaves
        .into_iter()
        .filter(|lp| !CONSUMED_POINTERS.iter().any(|cp| is_prefix_pointer(cp, lp)))
        .collect();

    let report = UnusedKeyReport {
        unused_leaf_pointers: unused.into_iter().collect(),
    };

    if policy == UnusedKeyPolicy::Fail && !report.is_clean() {
        bail!(
            "CONFIG_UNUSED_KEYS: {} unused config leaf key(s): {:?}",
            report.unused_leaf_pointers.len(),
            report.unused_leaf_pointers.iter().take(12).collect::<Vec<_>>()
        );
    }
    Ok(report)
}

/// "/a/b" covers "/a/b" and "/a/b/c" but not "/a/bc".
fn is_prefix_pointer(prefix: &str, leaf: &str) -> bool {
    leaf == prefix
        || (leaf.starts_with(prefix) && leaf.as_bytes().get(prefix.len()) == Some(&b'/'))
}

fn collect_leaf_pointers(v: &Value, prefix: &str, out: &mut Vec<String>) {
    match v {
        Value::Object(map) if !map.is_empty() => {
            for (k, vv) in map.iter() {
                let next = format!("{}/{}", prefix, k.replace('~', "~0").replace('/', "~1"));
                collect_leaf_pointers(vv, &next, out);
            }
        }
        Value::Array(arr) if !arr.is_empty() => {
            for (i, vv) in arr.iter().enumerate() {
                collect_leaf_pointers(vv, &format!("{prefix}/{i}"), out);
            }
        }
        _ => out.push(if prefix.is_empty() {
            "/".to_string()
        } else {
            prefix.to_string()
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn later_layers_override_and_arrays_replace() {
        let merged = deep_merge(
            json!({"fetch": {"timeout_ms": 6000, "max_concurrency": 4}, "modules": [1, 2]}),
            json!({"fetch": {"timeout_ms": 2000}, "modules": [3]}),
        );
        assert_eq!(
            merged,
            json!({"fetch": {"timeout_ms": 2000, "max_concurrency": 4}, "modules": [3]})
        );
    }

    #[test]
    fn prefix_boundaries() {
        assert!(is_prefix_pointer("/fetch", "/fetch/timeout_ms"));
        assert!(is_prefix_pointer("/fetch", "/fetch"));
        assert!(!is_prefix_pointer("/fetch", "/fetcher/x"));
    }

    #[test]
    fn unused_keys_are_listed() {
        let cfg = json!({"fetch": {"timeout_ms": 1}, "fetcher": {"typo": true}, "notes": "x"});
        let r = report_unused_keys(&cfg, UnusedKeyPolicy::Warn).unwrap();
        assert_eq!(r.unused_leaf_pointers, vec!["/fetcher/typo", "/notes"]);
        assert!(report_unused_keys(&cfg, UnusedKeyPolicy::Fail).is_err());
    }
}
