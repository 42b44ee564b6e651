//! A write that fails mid-publish aborts the run with an error, leaves the
//! intent marker without its complete marker, and does not touch modules
//! already published in the same run.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Result};
use rv_artifacts::{ArtifactStore, MemStore};
use rv_config::{PipelineConfig, ResolvedSecrets};
use rv_contract::verify_published;
use rv_producer::run_pipeline;
use serde_json::json;

/// Delegates to a memory store but refuses writes of one file.
struct FailingStore {
    inner: MemStore,
    fail_on: &'static str,
}

impl ArtifactStore for FailingStore {
    fn get(&self, rel: &str) -> Result<Option<Vec<u8>>> {
        self.inner.get(rel)
    }

    fn put_atomic(&self, rel: &str, bytes: &[u8]) -> Result<()> {
        if rel == self.fail_on {
            bail!("disk full: {rel}");
        }
        self.inner.put_atomic(rel, bytes)
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        self.inner.list(prefix)
    }

    fn delete(&self, rel: &str) -> Result<bool> {
        self.inner.delete(rel)
    }
}

#[tokio::test]
async fn scenario_failed_write_leaves_dangling_intent() -> Result<()> {
    let cfg = PipelineConfig::from_json(&json!({
        "modules": [
            {"id": "fx", "domain": "market", "source": "static",
             "provider": {"kind": "static", "records": [{"pair": "EURUSD"}]}},
            {"id": "movers", "domain": "market", "source": "static", "depends_on": ["fx"],
             "provider": {"kind": "static", "records": [{"symbol": "AAPL"}]}}
        ]
    }))?;

    let store = Arc::new(FailingStore {
        inner: MemStore::new(),
        fail_on: "market/movers/module-state.json",
    });
    let dyn_store: Arc<dyn ArtifactStore> = store.clone();

    let err = run_pipeline(&cfg, dyn_store, &ResolvedSecrets::default(), Path::new("."))
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("movers"), "{err:#}");

    assert!(verify_published(&store.inner, "market", "fx")?.is_valid());

    assert!(store.inner.get("market/movers/publish_intent.json")?.is_some());
    assert!(store.inner.get("market/movers/publish_complete.json")?.is_none());
    Ok(())
}
