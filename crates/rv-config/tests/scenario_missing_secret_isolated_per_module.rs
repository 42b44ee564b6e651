//! A missing provider key fails only the modules that name it.

use std::collections::HashMap;

use rv_config::{load_layered_yaml_from_strings, ResolvedSecrets};
use rv_schemas::ErrorCode;

const YAML: &str = r#"
modules:
  - id: eod
    domain: market
    source: eodhd
    provider: {kind: http, url: "https://example.invalid/eod", api_key_env: EODHD_API_KEY}
  - id: news
    domain: news
    source: marketaux
    provider: {kind: http, url: "https://example.invalid/news", api_key_env: MARKETAUX_API_KEY}
"#;

#[test]
fn scenario_missing_secret_isolated_per_module() {
    let cfg = load_layered_yaml_from_strings(&[YAML])
        .unwrap()
        .pipeline()
        .unwrap();
    let env: HashMap<&str, &str> = [("EODHD_API_KEY", "demo-key-1")].into_iter().collect();
    let secrets = ResolvedSecrets::from_config_with(&cfg, |k| env.get(k).map(|v| v.to_string()));

    assert_eq!(secrets.get("EODHD_API_KEY").unwrap().expose(), "demo-key-1");

    let err = secrets.get("MARKETAUX_API_KEY").unwrap_err();
    assert_eq!(err.code(), ErrorCode::MissingSecret);
    assert_eq!(secrets.missing().collect::<Vec<_>>(), vec!["MARKETAUX_API_KEY"]);

    let debug = format!("{secrets:?}");
    assert!(!debug.contains("demo-key-1"), "{debug}");
}
