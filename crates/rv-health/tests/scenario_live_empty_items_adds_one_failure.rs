use std::fs;

use anyhow::Result;
use chrono::Utc;
use rv_artifacts::{layout, FsStore};
use rv_health::{run_envelope_check, EnvelopeCheckArgs, RowRegistry};
use rv_schemas::ErrorCode;
use serde_json::json;
use tempfile::tempdir;

#[test]
fn scenario_live_empty_items_adds_one_failure() -> Result<()> {
    let tmp = tempdir()?;
    let mirrors = tmp.path().join(layout::MIRRORS_DIR);
    fs::create_dir_all(&mirrors)?;
    fs::write(
        mirrors.join("quotes.json"),
        serde_json::to_vec(&json!({"meta": {"status": "LIVE"}, "data": {"items": [{"s": "A"}]}}))?,
    )?;
    fs::write(
        mirrors.join("news.json"),
        serde_json::to_vec(&json!({"raw": {"dataQuality": {"status": "EMPTY"}, "data": {"items": []}}}))?,
    )?;

    let store = FsStore::new(tmp.path());
    let registry = RowRegistry::default().with("quotes", "data.items");
    let check = || {
        run_envelope_check(EnvelopeCheckArgs {
            store: &store,
            mirrors_dir: layout::MIRRORS_DIR,
            registry: &registry,
            strict: true,
            max_critical: 0,
            now: Utc::now(),
        })
    };

    let before = check()?;
    assert_eq!(before.failures_count, 0);
    assert!(before.passes());

    fs::write(
        mirrors.join("movers.json"),
        serde_json::to_vec(&json!({"meta": {"status": "LIVE"}, "data": {"items": []}}))?,
    )?;
    let after = check()?;
    assert_eq!(after.failures_count, before.failures_count + 1);
    assert_eq!(after.failures[0].problem, ErrorCode::LiveButEmpty);
    assert_eq!(after.failures[0].file, "mirrors/movers.json");
    assert!(!after.passes());

    let on_disk: serde_json::Value =
        serde_json::from_slice(&fs::read(tmp.path().join(layout::MIRROR_ENVELOPE_REPORT_PATH))?)?;
    assert_eq!(on_disk["schema"], "rv_mirror_envelope_report_v1");
    assert_eq!(on_disk["failures_count"], 1);
    Ok(())
}
