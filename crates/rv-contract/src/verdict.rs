use std::fmt;
use std::io::Write;

use rv_schemas::ErrorCode;
use serde::Serialize;

/// One contract violation. `path` is a JSON pointer, optionally prefixed with
/// the artifact label (`module-state:/digest`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub code: ErrorCode,
    pub path: String,
    pub message: String,
}

impl Violation {
    pub fn new(code: ErrorCode, path: impl Into<String>, message: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            code,
            path: if path.is_empty() { "/".to_string() } else { path },
            message: message.into(),
        }
    }

    /// Same violation, path prefixed with `label:`.
    pub fn labelled(mut self, label: &str) -> Self {
        self.path = format!("{label}:{}", self.path);
        self
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}: {}", self.code, self.path, self.message)
    }
}

/// Result of any contract check. Invalid carries every violation found, never
/// just the first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Valid,
    Invalid(Vec<Violation>),
}

impl Verdict {
    pub fn from_violations(v: Vec<Violation>) -> Self {
        if v.is_empty() {
            Verdict::Valid
        } else {
            Verdict::Invalid(v)
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Verdict::Valid)
    }

    pub fn violations(&self) -> &[Violation] {
        match self {
            Verdict::Valid => &[],
            Verdict::Invalid(v) => v,
        }
    }

    pub fn merge(self, other: Verdict) -> Verdict {
        let mut all = self.into_violations();
        all.extend(other.into_violations());
        Verdict::from_violations(all)
    }

    pub fn into_violations(self) -> Vec<Violation> {
        match self {
            Verdict::Valid => Vec::new(),
            Verdict::Invalid(v) => v,
        }
    }

    pub fn into_result(self) -> Result<(), Vec<Violation>> {
        match self {
            Verdict::Valid => Ok(()),
            Verdict::Invalid(v) => Err(v),
        }
    }
}

// ---------------------------------------------------------------------------
// CLI adapter
// ---------------------------------------------------------------------------

pub const EXIT_OK: i32 = 0;
pub const EXIT_FAIL: i32 = 1;

/// Render a verdict with the CLI convention and return the exit code.
///
/// Valid: one `OK: <subject>` line on `out`, exit 0.
/// Invalid: one `FAIL: <subject>: <violation>` line per violation on `err`, exit 1.
pub fn emit<O: Write, E: Write>(
    subject: &str,
    verdict: &Verdict,
    out: &mut O,
    err: &mut E,
) -> std::io::Result<i32> {
    match verdict {
        Verdict::Valid => {
            writeln!(out, "OK: {subject}")?;
            Ok(EXIT_OK)
        }
        Verdict::Invalid(violations) => {
            for v in violations {
                writeln!(err, "FAIL: {subject}: {v}")?;
            }
            Ok(EXIT_FAIL)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_prints_single_ok_line() {
        let (mut out, mut err) = (Vec::new(), Vec::new());
        let code = emit("snapshot.json", &Verdict::Valid, &mut out, &mut err).unwrap();
        assert_eq!(code, EXIT_OK);
        assert_eq!(String::from_utf8(out).unwrap(), "OK: snapshot.json\n");
        assert!(err.is_empty());
    }

    #[test]
    fn invalid_prints_every_violation() {
        let verdict = Verdict::from_violations(vec![
            Violation::new(ErrorCode::SchemaViolation, "/module", "missing"),
            Violation::new(ErrorCode::DigestMismatch, "", "digest differs").labelled("module-state"),
        ]);
        let (mut out, mut err) = (Vec::new(), Vec::new());
        let code = emit("fx", &verdict, &mut out, &mut err).unwrap();
        assert_eq!(code, EXIT_FAIL);
        assert!(out.is_empty());
        let err = String::from_utf8(err).unwrap();
        assert_eq!(err.lines().count(), 2);
        assert!(err.contains("FAIL: fx: DIGEST_MISMATCH at module-state:/: digest differs"));
    }

    #[test]
    fn merge_accumulates() {
        let a = Verdict::from_violations(vec![Violation::new(ErrorCode::StaleData, "/a", "x")]);
        let merged = a.merge(Verdict::Valid);
        assert_eq!(merged.violations().len(), 1);
        assert!(Verdict::Valid.merge(Verdict::Valid).is_valid());
    }
}
