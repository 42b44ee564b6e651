use std::path::PathBuf;
use std::sync::Arc;

use rv_artifacts::{get_json, ArtifactStore, StoreRead};
use rv_schemas::Snapshot;
use serde_json::Value;

use crate::provider::{extract_records, Provider, ProviderError, RawPayload};

/// Reads a JSON document from disk (drop-folder feeds, fixtures).
#[derive(Debug, Clone)]
pub struct FileProvider {
    source: String,
    path: PathBuf,
    records_pointer: Option<String>,
}

impl FileProvider {
    pub fn new(source: impl Into<String>, path: impl Into<PathBuf>, records_pointer: Option<String>) -> Self {
        Self {
            source: source.into(),
            path: path.into(),
            records_pointer,
        }
    }
}

#[async_trait::async_trait]
impl Provider for FileProvider {
    fn source_name(&self) -> &str {
        &self.source
    }

    async fn fetch(&self) -> Result<RawPayload, ProviderError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| ProviderError::Transport(format!("{}: {e}", self.path.display())))?;
        let body: Value = serde_json::from_slice(&bytes)
            .map_err(|e| ProviderError::Decode(format!("{}: {e}", self.path.display())))?;
        Ok(RawPayload::new(extract_records(body, self.records_pointer.as_deref())?))
    }
}

/// Derived module input: the published `data` of an upstream module.
///
/// Map-shaped data yields its values in key order.
pub struct UpstreamProvider {
    module: String,
    snapshot_rel: String,
    store: Arc<dyn ArtifactStore>,
}

impl UpstreamProvider {
    pub fn new(module: impl Into<String>, snapshot_rel: impl Into<String>, store: Arc<dyn ArtifactStore>) -> Self {
        Self {
            module: module.into(),
            snapshot_rel: snapshot_rel.into(),
            store,
        }
    }
}

#[async_trait::async_trait]
impl Provider for UpstreamProvider {
    fn source_name(&self) -> &str {
        &self.module
    }

    async fn fetch(&self) -> Result<RawPayload, ProviderError> {
        let read = get_json::<Snapshot>(self.store.as_ref(), &self.snapshot_rel)
            .map_err(|e| ProviderError::Transport(format!("{e:#}")))?;
        let snapshot = match read {
            StoreRead::Parsed(s) => s,
            StoreRead::Missing => {
                return Err(ProviderError::Upstream(format!("{} has no snapshot", self.module)))
            }
            StoreRead::Corrupt(e) => {
                return Err(ProviderError::Upstream(format!("{} snapshot unreadable: {e}", self.module)))
            }
        };
        if let Some(err) = &snapshot.error {
            return Err(ProviderError::Upstream(format!(
                "{} is a placeholder ({})",
                self.module, err.code
            )));
        }
        let records = match snapshot.data {
            Some(Value::Array(items)) => items,
            Some(Value::Object(map)) => map.into_iter().map(|(_, v)| v).collect(),
            _ => Vec::new(),
        };
        Ok(RawPayload {
            records,
            fetched_at: snapshot.metadata.published_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rv_artifacts::MemStore;
    use serde_json::json;

    #[tokio::test]
    async fn file_provider_reads_pointer() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("feed.json");
        std::fs::write(&p, br#"{"quotes": [{"s": "A"}, {"s": "B"}]}"#).unwrap();

        let provider = FileProvider::new("drop", &p, Some("/quotes".into()));
        assert_eq!(provider.fetch().await.unwrap().records.len(), 2);

        let missing = FileProvider::new("drop", dir.path().join("nope.json"), None);
        assert!(matches!(missing.fetch().await, Err(ProviderError::Transport(_))));
    }

    #[tokio::test]
    async fn upstream_missing_is_an_upstream_error() {
        let store: Arc<dyn ArtifactStore> = Arc::new(MemStore::new());
        store
            .put_atomic("market/universe/snapshot.json", json!({"bad": true}).to_string().as_bytes())
            .unwrap();
        let p = UpstreamProvider::new("universe", "market/universe/snapshot.json", store.clone());
        assert!(matches!(p.fetch().await, Err(ProviderError::Upstream(_))));

        let p = UpstreamProvider::new("fx", "market/fx/snapshot.json", store);
        let err = p.fetch().await.unwrap_err();
        assert!(err.to_string().contains("fx has no snapshot"), "{err}");
    }
}
