//! Orphan scan / guard over the artifact tree.
//!
//! Leftovers of failed runs are directories named `__broken_*`, `*.__prev`,
//! `*__tmp` or `*.bak`, plus stray atomic-writer temp files. Scan mode only
//! reports them; guard mode moves them under `.quarantine/<YYYY-MM-DD>/`.
//! A `publish_intent.json` not closed by a `publish_complete.json` of the same
//! run is critical in both modes.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rv_artifacts::atomic::TMP_MARKER;
use rv_artifacts::{layout, put_json, FsStore};
use rv_schemas::{ErrorCode, PublishMarker};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const ORPHAN_REPORT_SCHEMA: &str = "rv_orphan_guard_v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardMode {
    Scan,
    Guard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrphanKind {
    Directory,
    TempFile,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Orphan {
    pub path: String,
    pub name: String,
    pub kind: OrphanKind,
    pub modified: Option<DateTime<Utc>>,
    pub size_bytes: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DanglingIntent {
    pub path: String,
    pub code: ErrorCode,
    pub severity: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrphanReport {
    pub schema: String,
    pub mode: GuardMode,
    pub generated_at: DateTime<Utc>,
    pub orphans: Vec<Orphan>,
    pub quarantined: Vec<String>,
    pub quarantine_failures: Vec<String>,
    pub dangling_intents: Vec<DanglingIntent>,
}

impl OrphanReport {
    /// Dangling intents fail every mode. An orphan guard mode could not move
    /// out of the way fails too; scan mode never attempts a move.
    pub fn passes(&self) -> bool {
        self.dangling_intents.is_empty() && self.quarantine_failures.is_empty()
    }
}

pub fn is_toxic_dir(name: &str) -> bool {
    name.contains("__broken_")
        || name.ends_with(".__prev")
        || name.ends_with("__tmp")
        || name.ends_with(".bak")
}

fn rel_of(root: &Path, p: &Path) -> String {
    let rel = p.strip_prefix(root).unwrap_or(p);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn orphan_at(root: &Path, path: &Path, kind: OrphanKind) -> Orphan {
    let meta = fs::metadata(path).ok();
    Orphan {
        path: rel_of(root, path),
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        kind,
        modified: meta
            .as_ref()
            .and_then(|m| m.modified().ok())
            .map(DateTime::<Utc>::from),
        size_bytes: meta.map(|m| m.len()),
    }
}

/// Walk the tree. Toxic directories are reported whole, not entered.
fn walk(root: &Path, dir: &Path, orphans: &mut Vec<Orphan>, intent_dirs: &mut Vec<PathBuf>) -> Result<()> {
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e).with_context(|| format!("read_dir failed: {}", dir.display())),
    };
    let mut paths: Vec<(PathBuf, bool)> = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("read_dir entry failed: {}", dir.display()))?;
        let ft = entry.file_type().with_context(|| format!("file_type failed: {}", entry.path().display()))?;
        paths.push((entry.path(), ft.is_dir()));
    }
    paths.sort();

    for (path, is_dir) in paths {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if is_dir {
            if name == layout::QUARANTINE_DIR {
                continue;
            }
            if is_toxic_dir(&name) {
                orphans.push(orphan_at(root, &path, OrphanKind::Directory));
                continue;
            }
            walk(root, &path, orphans, intent_dirs)?;
        } else if name.contains(TMP_MARKER) {
            orphans.push(orphan_at(root, &path, OrphanKind::TempFile));
        } else if name == layout::PUBLISH_INTENT_FILE {
            intent_dirs.push(dir.to_path_buf());
        }
    }
    Ok(())
}

fn read_marker(path: &Path) -> Option<PublishMarker> {
    let bytes = fs::read(path).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Why the intent in `dir` is dangling, or `None` when it is closed.
fn dangling_reason(dir: &Path) -> Option<String> {
    let complete_path = dir.join(layout::PUBLISH_COMPLETE_FILE);
    if !complete_path.exists() {
        return Some(format!(
            "{} exists without {}",
            layout::PUBLISH_INTENT_FILE,
            layout::PUBLISH_COMPLETE_FILE
        ));
    }
    let intent = read_marker(&dir.join(layout::PUBLISH_INTENT_FILE));
    let complete = read_marker(&complete_path);
    match (intent, complete) {
        (Some(i), Some(c)) if c.closes(&i) => None,
        (Some(i), Some(c)) => Some(format!(
            "intent of run {} closed only by a complete of run {}",
            i.run_id, c.run_id
        )),
        _ => Some("publish marker unreadable".to_string()),
    }
}

fn quarantine(root: &Path, orphan: &Orphan, now: DateTime<Utc>) -> Result<()> {
    let dest = root
        .join(layout::QUARANTINE_DIR)
        .join(now.format("%Y-%m-%d").to_string())
        .join(&orphan.path);
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create dir failed: {}", parent.display()))?;
    }
    let src = root.join(&orphan.path);
    fs::rename(&src, &dest)
        .with_context(|| format!("quarantine move failed: {} -> {}", src.display(), dest.display()))
}

pub fn run_orphan_guard(store: &FsStore, mode: GuardMode, now: DateTime<Utc>) -> Result<OrphanReport> {
    let root = store.root();
    let mut orphans = Vec::new();
    let mut intent_dirs = Vec::new();
    walk(root, root, &mut orphans, &mut intent_dirs)?;

    let dangling_intents: Vec<DanglingIntent> = intent_dirs
        .iter()
        .filter_map(|dir| {
            dangling_reason(dir).map(|description| DanglingIntent {
                path: rel_of(root, &dir.join(layout::PUBLISH_INTENT_FILE)),
                code: ErrorCode::OrphanDanglingIntent,
                severity: "CRITICAL".to_string(),
                description,
            })
        })
        .collect();

    let mut quarantined = Vec::new();
    let mut quarantine_failures = Vec::new();
    if mode == GuardMode::Guard {
        for o in &orphans {
            match quarantine(root, o, now) {
                Ok(()) => {
                    info!(path = %o.path, "quarantined");
                    quarantined.push(o.path.clone());
                }
                Err(e) => {
                    warn!(path = %o.path, error = %format!("{e:#}"), "quarantine failed");
                    quarantine_failures.push(o.path.clone());
                }
            }
        }
    }

    let report = OrphanReport {
        schema: ORPHAN_REPORT_SCHEMA.to_string(),
        mode,
        generated_at: now,
        orphans,
        quarantined,
        quarantine_failures,
        dangling_intents,
    };
    put_json(store, layout::ORPHAN_REPORT_PATH, &report)?;
    for d in &report.dangling_intents {
        warn!(path = %d.path, "dangling publish intent");
    }
    info!(
        orphans = report.orphans.len(),
        quarantined = report.quarantined.len(),
        dangling = report.dangling_intents.len(),
        "orphan guard done"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toxic_names() {
        for n in ["__broken_2026", "universe.__prev", "snap__tmp", "old.bak", "x__broken_y"] {
            assert!(is_toxic_dir(n), "{n}");
        }
        for n in ["universe", "bak", "tmp", "prev"] {
            assert!(!is_toxic_dir(n), "{n}");
        }
    }

    #[test]
    fn complete_from_older_run_does_not_close_intent() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("market/fx");
        fs::create_dir_all(&dir).unwrap();
        let at = "2026-03-01T00:00:00Z";
        fs::write(
            dir.join(layout::PUBLISH_INTENT_FILE),
            format!(r#"{{"run_id":"r2","module":"fx","at":"{at}"}}"#),
        )
        .unwrap();
        fs::write(
            dir.join(layout::PUBLISH_COMPLETE_FILE),
            format!(r#"{{"run_id":"r1","module":"fx","at":"{at}"}}"#),
        )
        .unwrap();
        let why = dangling_reason(&dir).unwrap();
        assert!(why.contains("r2") && why.contains("r1"), "{why}");

        fs::write(
            dir.join(layout::PUBLISH_COMPLETE_FILE),
            format!(r#"{{"run_id":"r2","module":"fx","at":"{at}"}}"#),
        )
        .unwrap();
        assert!(dangling_reason(&dir).is_none());
    }

    #[test]
    fn guard_fails_when_an_orphan_cannot_be_quarantined() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsStore::new(tmp.path());
        let now: DateTime<Utc> = "2026-03-02T21:30:00Z".parse().unwrap();
        let broken = tmp.path().join("market/__broken_fx");
        fs::create_dir_all(&broken).unwrap();
        fs::write(broken.join("snapshot.json"), "{}").unwrap();

        // a non-empty directory already sits at the quarantine target
        let taken = tmp
            .path()
            .join(layout::QUARANTINE_DIR)
            .join("2026-03-02/market/__broken_fx");
        fs::create_dir_all(&taken).unwrap();
        fs::write(taken.join("snapshot.json"), "{}").unwrap();

        let scan = run_orphan_guard(&store, GuardMode::Scan, now).unwrap();
        assert_eq!(scan.orphans.len(), 1);
        assert!(scan.passes());

        let guard = run_orphan_guard(&store, GuardMode::Guard, now).unwrap();
        assert!(guard.quarantined.is_empty());
        assert_eq!(guard.quarantine_failures, vec!["market/__broken_fx".to_string()]);
        assert!(guard.dangling_intents.is_empty());
        assert!(!guard.passes());
        assert!(broken.exists());
    }
}
