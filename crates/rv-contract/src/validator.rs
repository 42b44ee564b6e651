//! JSON Schema validation (draft 2020-12) via `jsonschema`.
//!
//! Formats are asserted, not just annotated. Every violation is reported; a
//! missing required property or a forbidden additional property is reported
//! at that property's own pointer path. No I/O.

use anyhow::{Context, Result};
use jsonschema::error::ValidationErrorKind;
use jsonschema::Draft;
use rv_schemas::ErrorCode;
use serde_json::Value;

use crate::verdict::{Verdict, Violation};

fn child(path: &str, key: &str) -> String {
    format!("{path}/{}", key.replace('~', "~0").replace('/', "~1"))
}

/// Validate `doc` against `schema`. Errors only when the schema itself does
/// not compile.
pub fn validate(schema: &Value, doc: &Value) -> Result<Verdict> {
    let validator = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .should_validate_formats(true)
        .build(schema)
        .context("build schema validator")?;

    let mut out = Vec::new();
    for err in validator.iter_errors(doc) {
        let at = err.instance_path.to_string();
        match &err.kind {
            ValidationErrorKind::Required { property } => {
                let path = match property.as_str() {
                    Some(name) => child(&at, name),
                    None => at,
                };
                out.push(Violation::new(ErrorCode::SchemaViolation, path, err.to_string()));
            }
            ValidationErrorKind::AdditionalProperties { unexpected } => {
                for key in unexpected {
                    out.push(Violation::new(
                        ErrorCode::SchemaViolation,
                        child(&at, key),
                        "additional property is not allowed",
                    ));
                }
            }
            _ => out.push(Violation::new(ErrorCode::SchemaViolation, at, err.to_string())),
        }
    }
    out.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(Verdict::from_violations(out))
}
