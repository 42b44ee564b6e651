//! Two-phase publish of one module's pair.
//!
//! Write order: `publish_intent.json`, `snapshot.json`, `module-state.json`,
//! `manifest.json`, `publish_complete.json`. Every file goes through the
//! store's atomic put. An intent left without its complete marker is what the
//! orphan guard reports as a dangling publish.

use std::fmt;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rv_artifacts::{get_json, layout, sha256_hex, ArtifactStore, StoreRead};
use rv_contract::{check_pair, Violation};
use rv_schemas::{ArtifactRef, CollectionManifest, ModuleState, PublishMarker};
use serde::Serialize;
use tracing::{info, warn};

use crate::produce::Produced;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// The pair failed its contract; nothing was written.
    Contract(Vec<Violation>),
    Write { path: String, message: String },
}

impl fmt::Display for PublishError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishError::Contract(violations) => {
                write!(f, "pair contract failed with {} violation(s)", violations.len())?;
                for v in violations {
                    write!(f, "; {v}")?;
                }
                Ok(())
            }
            PublishError::Write { path, message } => write!(f, "write {path} failed: {message}"),
        }
    }
}

impl std::error::Error for PublishError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// `unchanged` is true when the digest equals the previously published one.
    Published { digest: String, unchanged: bool },
    /// Validation failed (drop threshold); the prior pair stays in place.
    Blocked { errors: Vec<String> },
}

pub struct PublishArgs<'a> {
    pub store: &'a dyn ArtifactStore,
    pub domain: &'a str,
    pub run_id: &'a str,
    pub produced: &'a Produced,
    pub now: DateTime<Utc>,
}

fn encode<T: Serialize>(value: &T, rel: &str) -> Result<Vec<u8>, PublishError> {
    let mut s = serde_json::to_string_pretty(value).map_err(|e| PublishError::Write {
        path: rel.to_string(),
        message: format!("serialize: {e}"),
    })?;
    s.push('\n');
    Ok(s.into_bytes())
}

fn put(store: &dyn ArtifactStore, rel: &str, bytes: &[u8]) -> Result<(), PublishError> {
    store.put_atomic(rel, bytes).map_err(|e| PublishError::Write {
        path: rel.to_string(),
        message: format!("{e:#}"),
    })
}

fn previous_digest(store: &dyn ArtifactStore, rel: &str) -> Option<String> {
    match get_json::<ModuleState>(store, rel) {
        Ok(StoreRead::Parsed(prev)) => Some(prev.digest),
        Ok(StoreRead::Corrupt(e)) => {
            warn!(path = rel, error = %e, "previous module-state unreadable");
            None
        }
        Ok(StoreRead::Missing) => None,
        Err(e) => {
            warn!(path = rel, error = %e, "previous module-state read failed");
            None
        }
    }
}

pub fn publish(args: PublishArgs<'_>) -> Result<PublishOutcome, PublishError> {
    let PublishArgs {
        store,
        domain,
        run_id,
        produced,
        now,
    } = args;
    let Produced { snapshot, state } = produced;
    let module = snapshot.module.as_str();

    let snapshot_rel = layout::snapshot_path(domain, module);
    let state_rel = layout::module_state_path(domain, module);

    let snapshot_bytes = encode(snapshot, &snapshot_rel)?;
    let state_bytes = encode(state, &state_rel)?;

    let contract = pair_verdict(&snapshot_bytes, &state_bytes, &snapshot_rel)?;
    if let Err(violations) = contract.into_result() {
        return Err(PublishError::Contract(violations));
    }

    if !snapshot.is_placeholder() && !snapshot.metadata.validation.passed {
        warn!(module, errors = ?state.validation.errors, "validation failed, keeping prior pair");
        return Ok(PublishOutcome::Blocked {
            errors: state.validation.errors.clone(),
        });
    }

    let unchanged = previous_digest(store, &state_rel).as_deref() == Some(state.digest.as_str());

    let intent = PublishMarker {
        run_id: run_id.to_string(),
        module: module.to_string(),
        at: now,
        digest: Some(state.digest.clone()),
    };
    let intent_rel = layout::publish_intent_path(domain, module);
    put(store, &intent_rel, &encode(&intent, &intent_rel)?)?;

    put(store, &snapshot_rel, &snapshot_bytes)?;
    put(store, &state_rel, &state_bytes)?;

    let manifest = CollectionManifest {
        schema_version: snapshot.schema_version.clone(),
        module: module.to_string(),
        run_id: run_id.to_string(),
        generated_at: now,
        artifacts: vec![
            artifact_ref(layout::SNAPSHOT_FILE, &snapshot_bytes),
            artifact_ref(layout::MODULE_STATE_FILE, &state_bytes),
        ],
    };
    let manifest_rel = layout::collection_manifest_path(domain, module);
    put(store, &manifest_rel, &encode(&manifest, &manifest_rel)?)?;

    let complete = PublishMarker { at: Utc::now().max(now), ..intent };
    let complete_rel = layout::publish_complete_path(domain, module);
    put(store, &complete_rel, &encode(&complete, &complete_rel)?)?;

    info!(module, digest = %state.digest, records = state.record_count, unchanged, "published");
    Ok(PublishOutcome::Published {
        digest: state.digest.clone(),
        unchanged,
    })
}

/// Contract check on exactly the bytes about to be written.
fn pair_verdict(
    snapshot_bytes: &[u8],
    state_bytes: &[u8],
    rel: &str,
) -> Result<rv_contract::Verdict, PublishError> {
    let check = || -> Result<rv_contract::Verdict> {
        let s = serde_json::from_slice(snapshot_bytes).context("re-read snapshot")?;
        let m = serde_json::from_slice(state_bytes).context("re-read module-state")?;
        check_pair(&s, &m)
    };
    check().map_err(|e| PublishError::Write {
        path: rel.to_string(),
        message: format!("{e:#}"),
    })
}

fn artifact_ref(file: &str, bytes: &[u8]) -> ArtifactRef {
    ArtifactRef {
        path: file.to_string(),
        sha256: sha256_hex(bytes),
        bytes: bytes.len() as u64,
    }
}
