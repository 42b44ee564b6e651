//! Typed view of the merged pipeline config.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use rv_schemas::{ErrorCode, Tier, SCHEMA_VERSION};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub artifact_root: Option<PathBuf>,
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub drop_policy: Option<DropPolicy>,
    #[serde(default)]
    pub modules: Vec<ModuleConfig>,
    #[serde(default)]
    pub severity: SeverityPolicy,
    #[serde(default)]
    pub retention: RetentionConfig,
    /// Request caps keyed by budget name (usually the provider host).
    #[serde(default)]
    pub budgets: BTreeMap<String, BudgetConfig>,
}

fn default_schema_version() -> String {
    SCHEMA_VERSION.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Extra attempts after the first one. Auth failures are never retried.
    #[serde(default)]
    pub retries: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

fn default_timeout_ms() -> u64 {
    6000
}
fn default_max_concurrency() -> usize {
    4
}
fn default_backoff_ms() -> u64 {
    250
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_concurrency: default_max_concurrency(),
            retries: 0,
            backoff_ms: default_backoff_ms(),
        }
    }
}

/// Record-drop tolerance. Either bound may be omitted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DropPolicy {
    #[serde(default)]
    pub max_drop_abs: Option<u64>,
    #[serde(default)]
    pub max_drop_ratio: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataShape {
    #[default]
    Array,
    /// Records keyed by the named field, e.g. `{map_by_key: symbol}`.
    MapByKey(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleConfig {
    pub id: String,
    pub domain: String,
    #[serde(default)]
    pub tier: Tier,
    pub source: String,
    #[serde(default = "default_stale_after")]
    pub stale_after_minutes: u64,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub data_shape: DataShape,
    /// Where consumers find rows inside an envelope-shaped mirror (`items`, `data.quotes`, ..).
    #[serde(default)]
    pub primary_record_path: Option<String>,
    /// Fields every raw record must carry; records missing any are dropped.
    #[serde(default)]
    pub record_schema: Vec<String>,
    pub provider: ProviderConfig,
}

fn default_stale_after() -> u64 {
    1440
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderConfig {
    Http {
        url: String,
        /// Env-var NAME holding the API key.
        #[serde(default)]
        api_key_env: Option<String>,
        #[serde(default = "default_key_param")]
        api_key_param: String,
        /// JSON pointer to the records array inside the response body.
        #[serde(default)]
        records_pointer: Option<String>,
        #[serde(default)]
        budget: Option<String>,
    },
    File {
        path: PathBuf,
        #[serde(default)]
        records_pointer: Option<String>,
    },
    /// Derived module: reads the published `data` of another module.
    Upstream { module: String },
    Static { records: Value },
}

fn default_key_param() -> String {
    "apikey".to_string()
}

impl ProviderConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderConfig::Http { .. } => "http",
            ProviderConfig::File { .. } => "file",
            ProviderConfig::Upstream { .. } => "upstream",
            ProviderConfig::Static { .. } => "static",
        }
    }
}

/// Gate policy. Codes are compared after normalization (uppercase).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityPolicy {
    #[serde(default = "default_blocking")]
    pub blocking_codes: Vec<String>,
    #[serde(default = "default_degrading")]
    pub degrading_codes: Vec<String>,
}

fn default_blocking() -> Vec<String> {
    [
        ErrorCode::SchemaViolation,
        ErrorCode::DigestMismatch,
        ErrorCode::JsonParseError,
        ErrorCode::LiveButEmpty,
        ErrorCode::OrphanDanglingIntent,
        ErrorCode::MissingSecret,
        ErrorCode::AuthFailed,
    ]
    .iter()
    .map(|c| c.as_str().to_string())
    .collect()
}

fn default_degrading() -> Vec<String> {
    [
        ErrorCode::StaleData,
        ErrorCode::SnapshotMissing,
        ErrorCode::MirrorMissing,
        ErrorCode::NonLiveButHasData,
        ErrorCode::UpstreamTimeout,
        ErrorCode::BudgetExhausted,
        ErrorCode::DropThresholdExceeded,
    ]
    .iter()
    .map(|c| c.as_str().to_string())
    .collect()
}

impl Default for SeverityPolicy {
    fn default() -> Self {
        Self {
            blocking_codes: default_blocking(),
            degrading_codes: default_degrading(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionConfig {
    #[serde(default = "default_strategy")]
    pub strategy: String,
    #[serde(default = "default_mirrors_days")]
    pub mirrors_retention_days: u64,
    #[serde(default = "default_ops_days")]
    pub ops_ledger_retention_days: u64,
    #[serde(default = "default_mirrors_dir")]
    pub mirrors_dir: String,
    #[serde(default = "default_drift_dir")]
    pub drift_dir: String,
}

fn default_strategy() -> String {
    "rolling".to_string()
}
fn default_mirrors_days() -> u64 {
    180
}
fn default_ops_days() -> u64 {
    365
}
fn default_mirrors_dir() -> String {
    "mirrors".to_string()
}
fn default_drift_dir() -> String {
    "system/drift".to_string()
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            mirrors_retention_days: default_mirrors_days(),
            ops_ledger_retention_days: default_ops_days(),
            mirrors_dir: default_mirrors_dir(),
            drift_dir: default_drift_dir(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetConfig {
    #[serde(default)]
    pub per_minute: Option<u32>,
    #[serde(default)]
    pub per_day: Option<u32>,
}

impl PipelineConfig {
    pub fn from_json(v: &Value) -> Result<Self> {
        let cfg: PipelineConfig =
            serde_json::from_value(v.clone()).context("pipeline config has the wrong shape")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn module(&self, id: &str) -> Option<&ModuleConfig> {
        self.modules.iter().find(|m| m.id == id)
    }

    /// Static checks. Dependency cycles are detected when the DAG is built.
    pub fn validate(&self) -> Result<()> {
        if self.fetch.max_concurrency == 0 {
            bail!("CONFIG_INVALID: fetch.max_concurrency must be >= 1");
        }
        if self.fetch.timeout_ms == 0 {
            bail!("CONFIG_INVALID: fetch.timeout_ms must be > 0");
        }
        if let Some(DropPolicy {
            max_drop_ratio: Some(r),
            ..
        }) = self.drop_policy
        {
            if !(0.0..=1.0).contains(&r) {
                bail!("CONFIG_INVALID: drop_policy.max_drop_ratio must be within [0, 1], got {r}");
            }
        }

        let mut seen = BTreeSet::new();
        for m in &self.modules {
            if m.id.trim().is_empty() || m.domain.trim().is_empty() {
                bail!("CONFIG_INVALID: module id and domain must be non-empty");
            }
            for (field, value) in [("id", &m.id), ("domain", &m.domain)] {
                if value.contains(['/', '\\']) || value.contains("..") {
                    bail!("CONFIG_INVALID: module {} {field} {value:?} is not a single path segment", m.id);
                }
            }
            if !seen.insert(m.id.as_str()) {
                bail!("CONFIG_INVALID: duplicate module id {}", m.id);
            }
        }
        for m in &self.modules {
            for dep in &m.depends_on {
                if !seen.contains(dep.as_str()) {
                    bail!("CONFIG_INVALID: module {} depends on unknown module {}", m.id, dep);
                }
            }
            if let ProviderConfig::Upstream { module } = &m.provider {
                if !m.depends_on.contains(module) {
                    bail!(
                        "CONFIG_INVALID: module {} reads upstream {} without declaring it in depends_on",
                        m.id,
                        module
                    );
                }
            }
            if let ProviderConfig::Http {
                budget: Some(b), ..
            } = &m.provider
            {
                if !self.budgets.contains_key(b) {
                    bail!("CONFIG_INVALID: module {} references unknown budget {}", m.id, b);
                }
            }
        }
        Ok(())
    }
}
