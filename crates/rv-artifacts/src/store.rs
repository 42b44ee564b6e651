//! Artifact store seam.
//!
//! The producer, aggregator and publisher only speak relative paths through
//! [`ArtifactStore`]. [`FsStore`] is the production backend (atomic writes on a
//! directory tree); [`MemStore`] backs unit tests.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::atomic::write_atomic;

pub trait ArtifactStore: Send + Sync {
    /// `Ok(None)` when the artifact does not exist.
    fn get(&self, rel: &str) -> Result<Option<Vec<u8>>>;

    /// Replace the artifact atomically. Readers never observe partial content.
    fn put_atomic(&self, rel: &str, bytes: &[u8]) -> Result<()>;

    /// All artifact paths under `prefix` (recursive), sorted.
    fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// `Ok(false)` when nothing was there.
    fn delete(&self, rel: &str) -> Result<bool>;
}

/// Outcome of reading and parsing a JSON artifact.
#[derive(Debug)]
pub enum StoreRead<T> {
    Missing,
    Parsed(T),
    Corrupt(String),
}

impl<T> StoreRead<T> {
    pub fn parsed(self) -> Option<T> {
        match self {
            StoreRead::Parsed(v) => Some(v),
            _ => None,
        }
    }
}

pub fn get_json<T: DeserializeOwned>(store: &dyn ArtifactStore, rel: &str) -> Result<StoreRead<T>> {
    let Some(bytes) = store.get(rel)? else {
        return Ok(StoreRead::Missing);
    };
    match serde_json::from_slice::<T>(&bytes) {
        Ok(v) => Ok(StoreRead::Parsed(v)),
        Err(e) => Ok(StoreRead::Corrupt(e.to_string())),
    }
}

/// Pretty JSON with trailing newline.
pub fn put_json<T: Serialize>(store: &dyn ArtifactStore, rel: &str, value: &T) -> Result<()> {
    let mut s = serde_json::to_string_pretty(value).with_context(|| format!("serialize failed: {rel}"))?;
    s.push('\n');
    store.put_atomic(rel, s.as_bytes())
}

fn check_rel(rel: &str) -> Result<()> {
    let p = Path::new(rel);
    if rel.is_empty() || p.is_absolute() {
        bail!("artifact path must be relative and non-empty: {rel:?}");
    }
    if p.components().any(|c| !matches!(c, Component::Normal(_))) {
        bail!("artifact path must not contain '..' or '.': {rel:?}");
    }
    Ok(())
}

// ----------------------------------------------------------------------------
// Disk backend
// ----------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn abs(&self, rel: &str) -> Result<PathBuf> {
        check_rel(rel)?;
        Ok(self.root.join(rel))
    }
}

fn walk_files(base: &Path, dir: &Path, out: &mut Vec<String>) -> Result<()> {
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e).with_context(|| format!("read_dir failed: {}", dir.display())),
    };
    for entry in entries {
        let entry = entry.with_context(|| format!("read_dir entry failed: {}", dir.display()))?;
        let path = entry.path();
        let ft = entry
            .file_type()
            .with_context(|| format!("file_type failed: {}", path.display()))?;
        if ft.is_dir() {
            walk_files(base, &path, out)?;
        } else if ft.is_file() {
            let rel = path
                .strip_prefix(base)
                .map_err(|_| anyhow!("walked outside root: {}", path.display()))?;
            let parts: Vec<String> = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            out.push(parts.join("/"));
        }
    }
    Ok(())
}

impl ArtifactStore for FsStore {
    fn get(&self, rel: &str) -> Result<Option<Vec<u8>>> {
        let p = self.abs(rel)?;
        match fs::read(&p) {
            Ok(b) => Ok(Some(b)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("read failed: {}", p.display())),
        }
    }

    fn put_atomic(&self, rel: &str, bytes: &[u8]) -> Result<()> {
        let p = self.abs(rel)?;
        write_atomic(&p, bytes)
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let start = if prefix.is_empty() {
            self.root.clone()
        } else {
            self.abs(prefix.trim_end_matches('/'))?
        };
        let mut out = Vec::new();
        walk_files(&self.root, &start, &mut out)?;
        out.sort();
        Ok(out)
    }

    fn delete(&self, rel: &str) -> Result<bool> {
        let p = self.abs(rel)?;
        match fs::remove_file(&p) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("remove failed: {}", p.display())),
        }
    }
}

// ----------------------------------------------------------------------------
// In-memory backend
// ----------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemStore {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>>> {
        self.files.lock().map_err(|_| anyhow!("mem store lock poisoned"))
    }
}

impl ArtifactStore for MemStore {
    fn get(&self, rel: &str) -> Result<Option<Vec<u8>>> {
        check_rel(rel)?;
        Ok(self.lock()?.get(rel).cloned())
    }

    fn put_atomic(&self, rel: &str, bytes: &[u8]) -> Result<()> {
        check_rel(rel)?;
        self.lock()?.insert(rel.to_string(), bytes.to_vec());
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let prefix = prefix.trim_end_matches('/');
        let files = self.lock()?;
        Ok(files
            .keys()
            .filter(|k| prefix.is_empty() || k.starts_with(&format!("{prefix}/")))
            .cloned()
            .collect())
    }

    fn delete(&self, rel: &str) -> Result<bool> {
        check_rel(rel)?;
        Ok(self.lock()?.remove(rel).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn exercise(store: &dyn ArtifactStore) {
        assert!(store.get("market/universe/snapshot.json").unwrap().is_none());

        put_json(store, "market/universe/snapshot.json", &json!({"a": 1})).unwrap();
        put_json(store, "market/fx/snapshot.json", &json!({"b": 2})).unwrap();
        store.put_atomic("system/health.json", b"{}").unwrap();

        let v: Value = get_json(store, "market/universe/snapshot.json")
            .unwrap()
            .parsed()
            .unwrap();
        assert_eq!(v["a"], 1);

        assert_eq!(
            store.list("market").unwrap(),
            vec!["market/fx/snapshot.json", "market/universe/snapshot.json"]
        );
        assert_eq!(store.list("").unwrap().len(), 3);

        store.put_atomic("system/broken.json", b"{not json").unwrap();
        assert!(matches!(
            get_json::<Value>(store, "system/broken.json").unwrap(),
            StoreRead::Corrupt(_)
        ));

        assert!(store.delete("system/health.json").unwrap());
        assert!(!store.delete("system/health.json").unwrap());
    }

    #[test]
    fn mem_store_contract() {
        exercise(&MemStore::new());
    }

    #[test]
    fn fs_store_contract() {
        let dir = tempfile::tempdir().unwrap();
        exercise(&FsStore::new(dir.path()));
    }

    #[test]
    fn rejects_escaping_paths() {
        let store = MemStore::new();
        assert!(store.put_atomic("../etc/passwd", b"x").is_err());
        assert!(store.put_atomic("/abs.json", b"x").is_err());
        assert!(store.get("").is_err());
    }
}
