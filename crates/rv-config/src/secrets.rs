//! Runtime secret resolution.
//!
//! Config YAML stores only env-var NAMES (`api_key_env: EODHD_API_KEY`).
//! [`ResolvedSecrets::from_config`] resolves every name once at startup; the
//! result is handed to provider constructors. Values never appear in `Debug`
//! output or error messages; errors carry the NAME only.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use rv_schemas::ErrorCode;

use crate::pipeline::{PipelineConfig, ProviderConfig};

/// A resolved secret. `Debug` and `Display` are redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue(String);

impl SecretValue {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<REDACTED>")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretError {
    /// The named env var is unset or blank.
    Missing { var: String },
}

impl SecretError {
    pub fn code(&self) -> ErrorCode {
        match self {
            SecretError::Missing { .. } => ErrorCode::MissingSecret,
        }
    }
}

impl fmt::Display for SecretError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecretError::Missing { var } => {
                write!(f, "MISSING_SECRET: env var '{var}' is not set or empty")
            }
        }
    }
}

impl std::error::Error for SecretError {}

/// Resolve `var_name` from the process environment.
pub fn resolve_secret(var_name: &str) -> Result<SecretValue, SecretError> {
    resolve_secret_with(var_name, |k| std::env::var(k).ok())
}

/// Resolve through an explicit lookup. Tests pass a map instead of mutating the
/// process environment.
pub fn resolve_secret_with<F>(var_name: &str, lookup: F) -> Result<SecretValue, SecretError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var_name) {
        Some(v) if !v.trim().is_empty() => Ok(SecretValue(v)),
        _ => Err(SecretError::Missing {
            var: var_name.to_string(),
        }),
    }
}

/// Every provider secret the config names, resolved once.
#[derive(Clone, Default)]
pub struct ResolvedSecrets {
    values: BTreeMap<String, SecretValue>,
    missing: BTreeSet<String>,
}

impl fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field("resolved", &self.values.keys().collect::<Vec<_>>())
            .field("missing", &self.missing)
            .finish()
    }
}

impl ResolvedSecrets {
    pub fn from_config(cfg: &PipelineConfig) -> Self {
        Self::from_config_with(cfg, |k| std::env::var(k).ok())
    }

    pub fn from_config_with<F>(cfg: &PipelineConfig, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut out = ResolvedSecrets::default();
        for m in &cfg.modules {
            if let ProviderConfig::Http {
                api_key_env: Some(var),
                ..
            } = &m.provider
            {
                match resolve_secret_with(var, &lookup) {
                    Ok(v) => {
                        out.values.insert(var.clone(), v);
                    }
                    Err(_) => {
                        out.missing.insert(var.clone());
                    }
                }
            }
        }
        out
    }

    /// Per-module lookup. A missing var fails only the modules that need it.
    pub fn get(&self, var_name: &str) -> Result<&SecretValue, SecretError> {
        self.values.get(var_name).ok_or_else(|| SecretError::Missing {
            var: var_name.to_string(),
        })
    }

    pub fn missing(&self) -> impl Iterator<Item = &str> {
        self.missing.iter().map(String::as_str)
    }
}
