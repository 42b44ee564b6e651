//! rv-md
//!
//! Provider boundary for the publication pipeline: the async [`Provider`]
//! trait, HTTP / file / upstream / static implementations, request budgets,
//! and the timeout + retry wrapper every fetch goes through.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use rv_artifacts::{layout, ArtifactStore};
use rv_config::{ModuleConfig, PipelineConfig, ProviderConfig, ResolvedSecrets};

mod budget;
mod fetch;
mod file;
mod http;
mod provider;

pub use budget::RequestBudget;
pub use fetch::{fetch_with_policy, FetchPolicy};
pub use file::{FileProvider, UpstreamProvider};
pub use http::HttpJsonProvider;
pub use provider::{extract_records, Provider, ProviderError, RawPayload, StaticProvider};

/// One budget instance per configured budget name, shared by every module
/// that references it.
pub fn budgets_from_config(cfg: &PipelineConfig) -> BTreeMap<String, Arc<RequestBudget>> {
    cfg.budgets
        .iter()
        .map(|(name, b)| (name.clone(), Arc::new(RequestBudget::new(name.clone(), *b))))
        .collect()
}

/// Build the provider for one module.
///
/// Relative file paths resolve against `base_dir`. A missing API key fails
/// here, so the module degrades to a placeholder without a network call.
pub fn provider_for(
    module: &ModuleConfig,
    cfg: &PipelineConfig,
    secrets: &ResolvedSecrets,
    store: Arc<dyn ArtifactStore>,
    base_dir: &Path,
) -> Result<Box<dyn Provider>, ProviderError> {
    Ok(match &module.provider {
        ProviderConfig::Http {
            url,
            api_key_env,
            api_key_param,
            records_pointer,
            ..
        } => {
            let mut p = HttpJsonProvider::new(module.source.clone(), url.clone())
                .with_records_pointer(records_pointer.clone());
            if let Some(var) = api_key_env {
                let key = secrets
                    .get(var)
                    .map_err(|_| ProviderError::MissingSecret { var: var.clone() })?;
                p = p.with_api_key(api_key_param.clone(), key.clone());
            }
            Box::new(p)
        }
        ProviderConfig::File {
            path,
            records_pointer,
        } => {
            let path = if path.is_absolute() {
                path.clone()
            } else {
                base_dir.join(path)
            };
            Box::new(FileProvider::new(module.source.clone(), path, records_pointer.clone()))
        }
        ProviderConfig::Upstream { module: upstream } => {
            let up = cfg
                .module(upstream)
                .ok_or_else(|| ProviderError::Upstream(format!("unknown upstream {upstream}")))?;
            Box::new(UpstreamProvider::new(
                upstream.clone(),
                layout::snapshot_path(&up.domain, &up.id),
                store,
            ))
        }
        ProviderConfig::Static { records } => {
            let records = match records {
                serde_json::Value::Array(items) => items.clone(),
                other => vec![other.clone()],
            };
            Box::new(StaticProvider::new(module.source.clone(), records))
        }
    })
}
