//! rv-contract
//!
//! Structural and semantic contracts for published artifacts:
//! - [`validate`]: JSON Schema (draft 2020-12), all violations with paths
//! - [`ArtifactKind`]: built-in schemas for every artifact the pipeline writes
//! - [`check_pair`]: snapshot / module-state agreement and digest recomputation
//! - [`Verdict`] + [`emit`]: the single check result type and its CLI rendering

mod kinds;
mod pair;
mod validator;
mod verdict;
mod verify;

pub use kinds::{validate_kind, ArtifactKind};
pub use pair::{check_pair, pair_agreement, snapshot_invariants};
pub use validator::validate;
pub use verdict::{emit, Verdict, Violation, EXIT_FAIL, EXIT_OK};
pub use verify::verify_published;
