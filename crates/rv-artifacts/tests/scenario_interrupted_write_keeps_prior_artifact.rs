//! A publish that dies after staging but before rename must leave the previously
//! committed artifact byte-identical, and the next write must still succeed.

use std::fs;

use rv_artifacts::atomic::{stage, write_json_atomic};
use serde_json::json;

#[test]
fn scenario_interrupted_write_keeps_prior_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("market/universe/snapshot.json");

    write_json_atomic(&target, &json!({"data": [1, 2, 3]})).unwrap();
    let before = fs::read(&target).unwrap();

    // Simulated crash: payload staged, process gone before commit.
    let staged = stage(&target, b"{\"data\": [").unwrap();
    let stray = staged.tmp_path().to_path_buf();
    std::mem::forget(staged);

    assert_eq!(fs::read(&target).unwrap(), before);
    assert!(stray.exists(), "stray temp stays behind for the orphan guard");

    write_json_atomic(&target, &json!({"data": [4]})).unwrap();
    let after: serde_json::Value = serde_json::from_slice(&fs::read(&target).unwrap()).unwrap();
    assert_eq!(after["data"], json!([4]));
}
