//! rv-artifacts
//!
//! Storage primitives of the publication pipeline:
//! - canonical JSON (recursive key sort) and the `sha256:` data digest
//! - the atomic writer (temp file + rename)
//! - the [`ArtifactStore`] seam with disk and in-memory backends
//! - the artifact tree layout (relative paths)

pub mod atomic;
pub mod canonical;
pub mod digest;
pub mod layout;
pub mod store;

pub use atomic::{stage, write_atomic, write_json_atomic, StagedWrite};
pub use canonical::{canonical_json, sort_keys};
pub use digest::{digest_value, is_valid_digest, sha256_hex, DIGEST_PREFIX};
pub use store::{get_json, put_json, ArtifactStore, FsStore, MemStore, StoreRead};
