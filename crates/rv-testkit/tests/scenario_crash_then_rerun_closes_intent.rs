use anyhow::Result;
use chrono::Utc;
use rv_guard::{run_orphan_guard, GuardMode};
use rv_testkit::{pipeline_config, universe_module, TestTree};

#[tokio::test]
async fn scenario_crash_then_rerun_closes_intent() -> Result<()> {
    let tree = TestTree::new()?;
    let cfg = pipeline_config(vec![universe_module(10)])?;

    // a run that died between intent and pair
    tree.write_raw(
        "market/universe/publish_intent.json",
        r#"{"run_id":"crashed","module":"universe","at":"2026-03-02T21:30:00Z"}"#,
    )?;
    let report = run_orphan_guard(&tree.fs_store(), GuardMode::Scan, Utc::now())?;
    assert!(!report.passes());

    // the next successful run rewrites intent and closes it with its own complete
    tree.run(&cfg).await?;
    let report = run_orphan_guard(&tree.fs_store(), GuardMode::Guard, Utc::now())?;
    assert!(report.passes(), "{:?}", report.dangling_intents);
    assert!(report.orphans.is_empty());
    Ok(())
}
