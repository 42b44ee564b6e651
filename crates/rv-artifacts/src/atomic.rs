//! Atomic file writer.
//!
//! Write to `<target>.tmp-<millis>-<pid>-<seq>` in the same directory, fsync,
//! then rename over the target. Readers see either the prior file or the new
//! one, never a partial write. A crash between [`stage`] and
//! [`StagedWrite::commit`] leaves the prior target untouched plus a stray temp
//! file, which the orphan guard classifies as toxic.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use serde::Serialize;

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

pub const TMP_MARKER: &str = ".tmp-";

/// A temp file that holds the full payload but has not replaced the target yet.
#[derive(Debug)]
pub struct StagedWrite {
    tmp: PathBuf,
    target: PathBuf,
}

impl StagedWrite {
    pub fn tmp_path(&self) -> &Path {
        &self.tmp
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Rename the temp file over the target. On failure the temp file stays
    /// on disk for the orphan guard.
    pub fn commit(self) -> Result<()> {
        fs::rename(&self.tmp, &self.target).with_context(|| {
            format!(
                "atomic rename failed: {} -> {}",
                self.tmp.display(),
                self.target.display()
            )
        })
    }

    /// Drop the staged payload without touching the target.
    pub fn abort(self) -> Result<()> {
        fs::remove_file(&self.tmp)
            .with_context(|| format!("remove staged temp failed: {}", self.tmp.display()))
    }
}

/// Unique sibling temp path for `target`.
pub fn tmp_path_for(target: &Path) -> PathBuf {
    let millis = chrono::Utc::now().timestamp_millis();
    let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
    let mut name: OsString = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("artifact"));
    name.push(format!("{TMP_MARKER}{millis}-{}-{seq}", std::process::id()));
    target.with_file_name(name)
}

/// Write the full payload to a fresh temp file next to `target` and fsync it.
pub fn stage(target: &Path, bytes: &[u8]) -> Result<StagedWrite> {
    if let Some(parent) = target.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create dir failed: {}", parent.display()))?;
        }
    }

    let tmp = tmp_path_for(target);
    let mut f = File::create(&tmp).with_context(|| format!("create temp failed: {}", tmp.display()))?;
    f.write_all(bytes)
        .with_context(|| format!("write temp failed: {}", tmp.display()))?;
    f.sync_all()
        .with_context(|| format!("fsync temp failed: {}", tmp.display()))?;

    Ok(StagedWrite {
        tmp,
        target: target.to_path_buf(),
    })
}

pub fn write_atomic(target: &Path, bytes: &[u8]) -> Result<()> {
    stage(target, bytes)?.commit()
}

/// Pretty JSON with a trailing newline, written atomically.
pub fn write_json_atomic<T: Serialize>(target: &Path, value: &T) -> Result<()> {
    let mut s = serde_json::to_string_pretty(value)
        .with_context(|| format!("serialize failed: {}", target.display()))?;
    s.push('\n');
    write_atomic(target, s.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_creates_parents_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("market/universe/snapshot.json");

        write_atomic(&p, b"one").unwrap();
        write_atomic(&p, b"two").unwrap();
        assert_eq!(fs::read(&p).unwrap(), b"two");

        let leftovers: Vec<_> = fs::read_dir(p.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(TMP_MARKER))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn temp_names_are_unique() {
        let p = Path::new("/x/health.json");
        assert_ne!(tmp_path_for(p), tmp_path_for(p));
        assert!(tmp_path_for(p)
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("health.json.tmp-"));
    }

    #[test]
    fn uncommitted_stage_leaves_prior_content() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("state.json");
        write_atomic(&p, b"prior").unwrap();

        let staged = stage(&p, b"next").unwrap();
        assert_eq!(fs::read(&p).unwrap(), b"prior");
        assert!(staged.tmp_path().exists());

        staged.abort().unwrap();
        assert_eq!(fs::read(&p).unwrap(), b"prior");
    }

    #[test]
    fn failed_rename_is_an_error_and_keeps_temp() {
        let dir = tempfile::tempdir().unwrap();
        // a non-empty directory cannot be replaced by a file
        let p = dir.path().join("snapshot.json");
        fs::create_dir_all(p.join("occupied")).unwrap();

        let staged = stage(&p, b"payload").unwrap();
        let tmp = staged.tmp_path().to_path_buf();
        let err = staged.commit().unwrap_err();
        assert!(format!("{err:#}").contains("atomic rename failed"));
        assert_eq!(fs::read(&tmp).unwrap(), b"payload");
    }
}
