//! Fixture builders shared by the cross-crate scenario tests.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rv_artifacts::{get_json, ArtifactStore, FsStore, StoreRead};
use rv_config::{PipelineConfig, ResolvedSecrets};
use rv_health::{aggregate, write_aggregate, Aggregate, AggregateArgs};
use rv_producer::{run_pipeline, RunReport};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tempfile::TempDir;

/// `n` equity universe rows keyed by `symbol`.
pub fn universe_records(n: usize) -> Vec<Value> {
    (0..n)
        .map(|i| {
            json!({
                "symbol": format!("SYM{i:04}"),
                "name": format!("Company {i}"),
                "exchange": if i % 2 == 0 { "NYSE" } else { "NASDAQ" },
            })
        })
        .collect()
}

/// Module entry with a static provider, in config JSON form.
pub fn static_module(id: &str, domain: &str, records: Vec<Value>) -> Value {
    json!({
        "id": id,
        "domain": domain,
        "source": "static",
        "provider": {"kind": "static", "records": records},
    })
}

/// The 500-row `universe` module every end-to-end scenario starts from.
pub fn universe_module(n: usize) -> Value {
    let mut m = static_module("universe", "market", universe_records(n));
    m["tier"] = json!("critical");
    m["data_shape"] = json!({"map_by_key": "symbol"});
    m["record_schema"] = json!(["symbol", "name"]);
    m
}

pub fn pipeline_config(modules: Vec<Value>) -> Result<PipelineConfig> {
    PipelineConfig::from_json(&json!({ "modules": modules })).context("fixture config invalid")
}

/// A throwaway artifact root backed by [`FsStore`].
pub struct TestTree {
    tmp: TempDir,
    store: Arc<dyn ArtifactStore>,
}

impl TestTree {
    pub fn new() -> Result<Self> {
        let tmp = tempfile::tempdir().context("create tempdir")?;
        let store: Arc<dyn ArtifactStore> = Arc::new(FsStore::new(tmp.path()));
        Ok(Self { tmp, store })
    }

    pub fn root(&self) -> &Path {
        self.tmp.path()
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.tmp.path().join(rel)
    }

    pub fn store(&self) -> Arc<dyn ArtifactStore> {
        Arc::clone(&self.store)
    }

    pub fn fs_store(&self) -> FsStore {
        FsStore::new(self.tmp.path())
    }

    pub async fn run(&self, cfg: &PipelineConfig) -> Result<RunReport> {
        run_pipeline(cfg, self.store(), &ResolvedSecrets::default(), self.root()).await
    }

    /// Aggregate and write manifest + health as of `now`.
    pub fn aggregate(&self, cfg: &PipelineConfig, now: DateTime<Utc>) -> Result<Aggregate> {
        let agg = aggregate(AggregateArgs {
            store: self.store.as_ref(),
            modules: &cfg.modules,
            schema_version: &cfg.schema_version,
            now,
        })?;
        write_aggregate(self.store.as_ref(), &agg)?;
        Ok(agg)
    }

    /// Parsed document at `rel`; missing or corrupt is an error.
    pub fn read<T: DeserializeOwned>(&self, rel: &str) -> Result<T> {
        match get_json::<T>(self.store.as_ref(), rel)? {
            StoreRead::Parsed(v) => Ok(v),
            StoreRead::Missing => anyhow::bail!("{rel} missing"),
            StoreRead::Corrupt(e) => anyhow::bail!("{rel} corrupt: {e}"),
        }
    }

    /// Raw write that bypasses the atomic writer, for tampering and crash fixtures.
    pub fn write_raw(&self, rel: &str, bytes: impl AsRef<[u8]>) -> Result<()> {
        let p = self.path(rel);
        if let Some(parent) = p.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create dir: {}", parent.display()))?;
        }
        fs::write(&p, bytes).with_context(|| format!("write fixture: {}", p.display()))
    }

    pub fn remove(&self, rel: &str) -> Result<()> {
        fs::remove_file(self.path(rel)).with_context(|| format!("remove fixture: {rel}"))
    }
}
