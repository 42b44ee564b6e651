//! Batch run over the module DAG.
//!
//! Per layer: fetch every module concurrently (bounded by
//! `fetch.max_concurrency`, each call under timeout, retries and its request
//! budget), then produce and publish sequentially in id order. Provider
//! failures degrade to placeholders. A publish failure aborts the run; modules
//! published before it keep their artifacts.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rv_artifacts::ArtifactStore;
use rv_config::{ModuleConfig, PipelineConfig, ProviderConfig, ResolvedSecrets};
use rv_md::{
    budgets_from_config, extract_records, fetch_with_policy, provider_for, FetchPolicy, Provider,
    ProviderError, RawPayload, RequestBudget,
};
use rv_schemas::ErrorCode;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};
use uuid::Uuid;

use crate::dag::ModuleDag;
use crate::produce::{placeholder, produce, ProduceContext, Produced};
use crate::publish::{publish, PublishArgs, PublishOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleStatus {
    Published,
    Unchanged,
    Placeholder,
    Blocked,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleOutcome {
    pub module: String,
    pub status: ModuleStatus,
    pub digest: Option<String>,
    pub record_count: u64,
    /// Placeholders report their cause (see [`rv_schemas::Snapshot::placeholder_cause`]).
    pub code: Option<ErrorCode>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub modules: Vec<ModuleOutcome>,
}

impl RunReport {
    pub fn count(&self, status: ModuleStatus) -> usize {
        self.modules.iter().filter(|m| m.status == status).count()
    }
}

fn budget_for<'a>(
    module: &ModuleConfig,
    budgets: &'a BTreeMap<String, Arc<RequestBudget>>,
) -> Option<&'a Arc<RequestBudget>> {
    match &module.provider {
        ProviderConfig::Http { budget: Some(b), .. } => budgets.get(b),
        ProviderConfig::Http { budget: None, .. } => budgets.get(&module.source),
        _ => None,
    }
}

async fn fetch_layer(
    layer: &[String],
    cfg: &PipelineConfig,
    store: &Arc<dyn ArtifactStore>,
    secrets: &ResolvedSecrets,
    base_dir: &Path,
    budgets: &BTreeMap<String, Arc<RequestBudget>>,
) -> Result<BTreeMap<String, Result<RawPayload, ProviderError>>> {
    let policy = FetchPolicy::from(&cfg.fetch);
    let permits = Arc::new(Semaphore::new(cfg.fetch.max_concurrency.max(1)));
    let mut fetched = BTreeMap::new();
    let mut set = JoinSet::new();

    for id in layer {
        let module = cfg
            .module(id)
            .ok_or_else(|| anyhow!("module {id} missing from config"))?;
        let provider: Arc<dyn Provider> =
            match provider_for(module, cfg, secrets, Arc::clone(store), base_dir) {
                Ok(p) => Arc::from(p),
                Err(e) => {
                    fetched.insert(id.clone(), Err(e));
                    continue;
                }
            };
        let budget = budget_for(module, budgets).cloned();
        let permits = Arc::clone(&permits);
        let id = id.clone();
        set.spawn(async move {
            let _permit = permits.acquire_owned().await.ok();
            let res = fetch_with_policy(&id, provider.as_ref(), budget.as_deref(), policy).await;
            (id, res)
        });
    }

    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((id, res)) => {
                fetched.insert(id, res);
            }
            Err(e) => warn!(error = %e, "fetch task did not complete"),
        }
    }
    Ok(fetched)
}

fn ctx(cfg: &PipelineConfig) -> ProduceContext<'_> {
    ProduceContext {
        schema_version: &cfg.schema_version,
        drop_policy: cfg.drop_policy.as_ref(),
    }
}

fn publish_one(
    store: &dyn ArtifactStore,
    module: &ModuleConfig,
    run_id: &str,
    produced: &Produced,
    now: DateTime<Utc>,
) -> Result<ModuleOutcome> {
    let outcome = publish(PublishArgs {
        store,
        domain: &module.domain,
        run_id,
        produced,
        now,
    })
    .with_context(|| format!("publish of module {} failed", module.id))?;

    let snap = &produced.snapshot;
    let error = snap.error.as_ref();
    let (status, digest) = match outcome {
        PublishOutcome::Blocked { .. } => (ModuleStatus::Blocked, None),
        PublishOutcome::Published { digest, .. } if error.is_some() => (ModuleStatus::Placeholder, Some(digest)),
        PublishOutcome::Published { digest, unchanged: true } => (ModuleStatus::Unchanged, Some(digest)),
        PublishOutcome::Published { digest, unchanged: false } => (ModuleStatus::Published, Some(digest)),
    };
    let (code, message) = match (status, error) {
        (_, Some(e)) => (snap.placeholder_cause(), Some(e.message.clone())),
        (ModuleStatus::Blocked, None) => (
            Some(ErrorCode::DropThresholdExceeded),
            produced.state.validation.errors.first().cloned(),
        ),
        _ => (None, None),
    };

    Ok(ModuleOutcome {
        module: module.id.clone(),
        status,
        digest,
        record_count: snap.metadata.record_count,
        code,
        message,
    })
}

/// Run every configured module once.
pub async fn run_pipeline(
    cfg: &PipelineConfig,
    store: Arc<dyn ArtifactStore>,
    secrets: &ResolvedSecrets,
    base_dir: &Path,
) -> Result<RunReport> {
    let dag = ModuleDag::build(&cfg.modules).context("module graph is invalid")?;
    let run_id = Uuid::new_v4().to_string();
    let started_at = Utc::now();
    let budgets = budgets_from_config(cfg);
    for var in secrets.missing() {
        warn!(var, "secret not set; modules using it will publish placeholders");
    }
    info!(run_id = %run_id, modules = cfg.modules.len(), layers = dag.layers().len(), "run started");

    let mut outcomes = Vec::with_capacity(cfg.modules.len());
    for layer in dag.layers() {
        let mut fetched = fetch_layer(layer, cfg, &store, secrets, base_dir, &budgets).await?;

        for id in layer {
            let module = cfg
                .module(id)
                .ok_or_else(|| anyhow!("module {id} missing from config"))?;
            let now = Utc::now();
            let produced = match fetched.remove(id) {
                Some(Ok(payload)) => produce(module, ctx(cfg), payload.records, payload.fetched_at, now)?,
                Some(Err(e)) => {
                    warn!(module = %id, code = %e.code(), error = %e, "fetch failed, publishing placeholder");
                    placeholder(module, ctx(cfg), e.code(), e.to_string(), now)?
                }
                None => placeholder(
                    module,
                    ctx(cfg),
                    ErrorCode::SnapshotMissing,
                    "fetch task did not complete",
                    now,
                )?,
            };
            outcomes.push(publish_one(store.as_ref(), module, &run_id, &produced, now)?);
        }
    }

    let report = RunReport {
        run_id,
        started_at,
        finished_at: Utc::now(),
        modules: outcomes,
    };
    info!(
        run_id = %report.run_id,
        published = report.count(ModuleStatus::Published),
        unchanged = report.count(ModuleStatus::Unchanged),
        placeholders = report.count(ModuleStatus::Placeholder),
        blocked = report.count(ModuleStatus::Blocked),
        "run finished"
    );
    Ok(report)
}

/// Produce and publish one module from a raw payload already on hand.
///
/// `raw` is either the record array or a provider response; the module's
/// `records_pointer`, when configured, selects the records inside it.
pub fn produce_from_payload(
    cfg: &PipelineConfig,
    module_id: &str,
    raw: Value,
    store: &dyn ArtifactStore,
) -> Result<ModuleOutcome> {
    let module = cfg
        .module(module_id)
        .ok_or_else(|| anyhow!("unknown module {module_id}"))?;
    let pointer = match &module.provider {
        ProviderConfig::Http { records_pointer, .. } | ProviderConfig::File { records_pointer, .. } => {
            records_pointer.as_deref()
        }
        _ => None,
    };
    let records = extract_records(raw, pointer).with_context(|| format!("payload for {module_id}"))?;
    let now = Utc::now();
    let produced = produce(module, ctx(cfg), records, now, now)?;
    publish_one(store, module, &Uuid::new_v4().to_string(), &produced, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rv_artifacts::{get_json, MemStore};
    use rv_schemas::Snapshot;
    use serde_json::json;

    fn cfg(modules: Value) -> PipelineConfig {
        PipelineConfig::from_json(&json!({ "modules": modules })).unwrap()
    }

    #[tokio::test]
    async fn upstream_module_reads_published_data_of_its_dependency() {
        let cfg = cfg(json!([
            {"id": "universe", "domain": "market", "source": "static",
             "provider": {"kind": "static", "records": [{"symbol": "AAPL"}, {"symbol": "MSFT"}]}},
            {"id": "eod", "domain": "market", "source": "derived", "depends_on": ["universe"],
             "provider": {"kind": "upstream", "module": "universe"}},
        ]));
        let store: Arc<dyn ArtifactStore> = Arc::new(MemStore::new());
        let report = run_pipeline(&cfg, Arc::clone(&store), &ResolvedSecrets::default(), Path::new("."))
            .await
            .unwrap();

        assert_eq!(report.count(ModuleStatus::Published), 2);
        let eod: Snapshot = get_json(store.as_ref(), "market/eod/snapshot.json").unwrap().parsed().unwrap();
        assert_eq!(eod.metadata.record_count, 2);
    }

    #[tokio::test]
    async fn missing_secret_degrades_only_that_module() {
        let cfg = cfg(json!([
            {"id": "news", "domain": "feeds", "source": "fmp",
             "provider": {"kind": "http", "url": "http://127.0.0.1:9/news", "api_key_env": "RV_TEST_UNSET_KEY"}},
            {"id": "fx", "domain": "market", "source": "static",
             "provider": {"kind": "static", "records": [{"pair": "EURUSD"}]}},
        ]));
        let store: Arc<dyn ArtifactStore> = Arc::new(MemStore::new());
        let report = run_pipeline(&cfg, Arc::clone(&store), &ResolvedSecrets::default(), Path::new("."))
            .await
            .unwrap();

        let news = report.modules.iter().find(|m| m.module == "news").unwrap();
        assert_eq!(news.status, ModuleStatus::Placeholder);
        assert_eq!(news.code, Some(ErrorCode::MissingSecret));
        let fx = report.modules.iter().find(|m| m.module == "fx").unwrap();
        assert_eq!(fx.status, ModuleStatus::Published);

        let snap: Snapshot = get_json(store.as_ref(), "feeds/news/snapshot.json").unwrap().parsed().unwrap();
        let err = snap.error.as_ref().unwrap();
        assert_eq!(err.code, ErrorCode::SnapshotMissing);
        assert!(err.message.starts_with("MISSING_SECRET: "), "{}", err.message);
        assert_eq!(snap.meta.reason.as_deref(), Some("MISSING_SECRET"));
    }

    #[test]
    fn produce_from_payload_honours_records_pointer() {
        let cfg = cfg(json!([
            {"id": "quotes", "domain": "market", "source": "fmp",
             "provider": {"kind": "file", "path": "quotes.json", "records_pointer": "/data/quotes"}},
        ]));
        let store = MemStore::new();
        let out = produce_from_payload(
            &cfg,
            "quotes",
            json!({"data": {"quotes": [{"s": "A"}, {"s": "B"}, {"s": "C"}]}}),
            &store,
        )
        .unwrap();
        assert_eq!(out.record_count, 3);
        assert_eq!(out.status, ModuleStatus::Published);
        assert!(produce_from_payload(&cfg, "ghost", json!([]), &store).is_err());
    }
}
