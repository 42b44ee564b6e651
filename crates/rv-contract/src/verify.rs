//! Post-publish verification: re-read published pairs from the store and run
//! the full pair contract on them.

use anyhow::Result;
use rv_artifacts::layout::{module_state_path, snapshot_path};
use rv_artifacts::{get_json, ArtifactStore, StoreRead};
use rv_schemas::ErrorCode;
use serde_json::Value;

use crate::pair::{check_pair, SNAPSHOT_LABEL, STATE_LABEL};
use crate::verdict::{Verdict, Violation};

fn load(store: &dyn ArtifactStore, rel: &str, label: &str) -> Result<Result<Value, Violation>> {
    Ok(match get_json::<Value>(store, rel)? {
        StoreRead::Parsed(v) => Ok(v),
        StoreRead::Missing => Err(Violation::new(
            ErrorCode::SnapshotMissing,
            "",
            format!("{rel} not found"),
        )
        .labelled(label)),
        StoreRead::Corrupt(e) => Err(Violation::new(
            ErrorCode::JsonParseError,
            "",
            format!("{rel}: {e}"),
        )
        .labelled(label)),
    })
}

/// Verify one module's published pair.
pub fn verify_published(store: &dyn ArtifactStore, domain: &str, module: &str) -> Result<Verdict> {
    let snapshot = load(store, &snapshot_path(domain, module), SNAPSHOT_LABEL)?;
    let state = load(store, &module_state_path(domain, module), STATE_LABEL)?;

    match (snapshot, state) {
        (Ok(s), Ok(m)) => check_pair(&s, &m),
        (s, m) => Ok(Verdict::from_violations(
            [s.err(), m.err()].into_iter().flatten().collect(),
        )),
    }
}
