//! rv-schemas
//!
//! Wire-level data model shared by every stage of the publication pipeline:
//! snapshot / module-state pairs, the response envelope, manifest and health
//! documents, and the error taxonomy.
//!
//! Pure types plus the envelope normalizer. No IO.

mod codes;
mod envelope;
mod health;
mod marker;
mod snapshot;

pub use codes::ErrorCode;
pub use envelope::{normalize, Envelope, EnvelopeError, EnvelopeInput, EnvelopeMeta, MetaStatus};
pub use health::{
    ArtifactRef, CollectionManifest, Evidence, HealthEntry, HealthReport, HealthStatus,
    HealthSummary, Manifest, ManifestEntry, OverallStatus,
};
pub use marker::PublishMarker;
pub use snapshot::{
    ModuleState, Snapshot, SnapshotError, SnapshotMeta, SnapshotMetadata, SnapshotValidation,
    StateValidation, Tier,
};

/// Schema version stamped on every snapshot and module-state record.
pub const SCHEMA_VERSION: &str = "3.0";
