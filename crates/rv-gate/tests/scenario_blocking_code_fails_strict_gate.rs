use anyhow::Result;
use rv_artifacts::{layout, put_json, FsStore};
use rv_config::SeverityPolicy;
use rv_gate::{emit_gate, gate_health, EXIT_GREEN, EXIT_NOT_GREEN};
use serde_json::json;
use tempfile::tempdir;

#[test]
fn scenario_blocking_code_fails_strict_gate() -> Result<()> {
    let tmp = tempdir()?;
    let store = FsStore::new(tmp.path());
    put_json(
        &store,
        layout::HEALTH_PATH,
        &json!({
            "schema_version": "3.0",
            "generated_at": chrono::Utc::now(),
            "status": "DEGRADED",
            "reasons": ["fx:STALE_DATA", "movers:DIGEST_MISMATCH"],
            "summary": {"modules_total": 3, "ok": 1, "stale": 1, "stub": 0, "error": 1, "critical_ok": true},
            "modules": []
        }),
    )?;

    let policy = SeverityPolicy::default();
    let result = gate_health(&store, &policy)?;
    assert!(!result.pass);
    assert_eq!(result.blocking().count(), 1);
    assert_eq!(result.degrading().count(), 1);

    let (mut out, mut err) = (Vec::new(), Vec::new());
    assert_eq!(emit_gate(&result, true, &mut out, &mut err)?, EXIT_NOT_GREEN);
    let err = String::from_utf8(err)?;
    assert!(err.contains("NOT GREEN: DIGEST_MISMATCH"), "{err}");
    assert!(err.contains("DEGRADED: STALE_DATA"), "{err}");

    // the same report in non-strict mode only warns
    let (mut out, mut err) = (Vec::new(), Vec::new());
    assert_eq!(emit_gate(&result, false, &mut out, &mut err)?, EXIT_GREEN);
    assert!(out.is_empty());
    assert!(String::from_utf8(err)?.contains("WARN: severity gate not green"));

    // degrading only: green in strict mode too
    put_json(
        &store,
        layout::HEALTH_PATH,
        &json!({"status": "DEGRADED", "reasons": ["fx:STALE_DATA"]}),
    )?;
    let result = gate_health(&store, &policy)?;
    let (mut out, mut err) = (Vec::new(), Vec::new());
    assert_eq!(emit_gate(&result, true, &mut out, &mut err)?, EXIT_GREEN);
    assert!(String::from_utf8(out)?.starts_with("OK: severity gate green"));
    Ok(())
}
