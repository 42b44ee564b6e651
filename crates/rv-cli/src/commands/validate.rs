//! `rv validate doc` and `rv validate pairs`.

use std::fs;
use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use rv_artifacts::FsStore;
use rv_contract::{emit, validate_kind, verify_published, ArtifactKind, Verdict, Violation};
use rv_schemas::ErrorCode;
use serde_json::Value;

use super::{load_pipeline, resolve_root};

pub fn parse_kind(s: &str) -> Result<ArtifactKind, String> {
    ArtifactKind::parse(s).ok_or_else(|| {
        let known: Vec<&str> = ArtifactKind::ALL.iter().map(|k| k.as_str()).collect();
        format!("unknown kind '{s}', expected one of: {}", known.join(" | "))
    })
}

pub fn doc(kind: ArtifactKind, file: &Path) -> Result<i32> {
    let subject = file.display().to_string();
    let bytes = fs::read(file).with_context(|| format!("read failed: {subject}"))?;
    let verdict = match serde_json::from_slice::<Value>(&bytes) {
        Ok(v) => validate_kind(kind, &v)?,
        Err(e) => Verdict::Invalid(vec![Violation::new(ErrorCode::JsonParseError, "/", e.to_string())]),
    };
    Ok(emit(&subject, &verdict, &mut io::stdout(), &mut io::stderr())?)
}

/// Re-verify every configured module's published pair; all violations are reported.
pub fn pairs(root: Option<&Path>, config_paths: &[String]) -> Result<i32> {
    let lp = load_pipeline(config_paths)?;
    let root = resolve_root(root, Some(&lp.cfg))?;
    let store = FsStore::new(&root);

    let mut all = Verdict::Valid;
    for m in &lp.cfg.modules {
        let label = format!("{}/{}", m.domain, m.id);
        let v = verify_published(&store, &m.domain, &m.id)?;
        let labelled = v.into_violations().into_iter().map(|x| x.labelled(&label)).collect();
        all = all.merge(Verdict::from_violations(labelled));
    }
    let subject = format!("published pairs ({} modules)", lp.cfg.modules.len());
    Ok(emit(&subject, &all, &mut io::stdout(), &mut io::stderr())?)
}
