//! Config hash stability: same input -> same hash, key order irrelevant,
//! value changes and overlays change the hash.

use rv_config::load_layered_yaml_from_strings;

const BASE_YAML: &str = r#"
schema_version: "3.0"
fetch:
  timeout_ms: 6000
  max_concurrency: 4
drop_policy:
  max_drop_abs: 5
  max_drop_ratio: 0.001
modules:
  - id: universe
    domain: market
    tier: critical
    source: sec
    provider:
      kind: http
      url: "https://example.invalid/universe"
      api_key_env: UNIVERSE_API_KEY
"#;

const BASE_YAML_REORDERED: &str = r#"
modules:
  - provider:
      api_key_env: UNIVERSE_API_KEY
      url: "https://example.invalid/universe"
      kind: http
    source: sec
    tier: critical
    domain: market
    id: universe
drop_policy:
  max_drop_ratio: 0.001
  max_drop_abs: 5
fetch:
  max_concurrency: 4
  timeout_ms: 6000
schema_version: "3.0"
"#;

const OVERLAY_YAML: &str = r#"
fetch:
  timeout_ms: 2000
"#;

#[test]
fn same_input_produces_identical_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    assert_eq!(a.config_hash, b.config_hash);
    assert_eq!(a.canonical_json, b.canonical_json);
    assert_eq!(a.config_hash.len(), 64);
}

#[test]
fn key_order_does_not_change_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML_REORDERED]).unwrap();
    assert_eq!(a.config_hash, b.config_hash);
}

#[test]
fn overlay_changes_hash_and_value() {
    let base = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let layered = load_layered_yaml_from_strings(&[BASE_YAML, OVERLAY_YAML]).unwrap();
    assert_ne!(base.config_hash, layered.config_hash);

    let cfg = layered.pipeline().unwrap();
    assert_eq!(cfg.fetch.timeout_ms, 2000);
    assert_eq!(cfg.fetch.max_concurrency, 4);
    assert_eq!(cfg.modules.len(), 1);
}
