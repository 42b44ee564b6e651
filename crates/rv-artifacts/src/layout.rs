//! Artifact tree layout. All paths are relative to the artifact root and use `/`.
//!
//! ```text
//! <domain>/<module>/snapshot.json
//! <domain>/<module>/module-state.json
//! <domain>/<module>/manifest.json
//! <domain>/<module>/publish_intent.json
//! <domain>/<module>/publish_complete.json
//! system/health.json
//! system/manifest.json
//! system/health_history.json
//! system/retention-cleanup.latest.json
//! reports/orphan_guard_report.json
//! reports/mirror_envelope_report.json
//! mirrors/**.json
//! ```

pub const SNAPSHOT_FILE: &str = "snapshot.json";
pub const MODULE_STATE_FILE: &str = "module-state.json";
pub const COLLECTION_MANIFEST_FILE: &str = "manifest.json";
pub const PUBLISH_INTENT_FILE: &str = "publish_intent.json";
pub const PUBLISH_COMPLETE_FILE: &str = "publish_complete.json";

pub const SYSTEM_DIR: &str = "system";
pub const REPORTS_DIR: &str = "reports";
pub const MIRRORS_DIR: &str = "mirrors";
pub const QUARANTINE_DIR: &str = ".quarantine";

pub const HEALTH_PATH: &str = "system/health.json";
pub const MANIFEST_PATH: &str = "system/manifest.json";
pub const HEALTH_HISTORY_PATH: &str = "system/health_history.json";
pub const RETENTION_REPORT_PATH: &str = "system/retention-cleanup.latest.json";
pub const ORPHAN_REPORT_PATH: &str = "reports/orphan_guard_report.json";
pub const MIRROR_ENVELOPE_REPORT_PATH: &str = "reports/mirror_envelope_report.json";

pub fn module_dir(domain: &str, module: &str) -> String {
    format!("{domain}/{module}")
}

pub fn snapshot_path(domain: &str, module: &str) -> String {
    format!("{domain}/{module}/{SNAPSHOT_FILE}")
}

pub fn module_state_path(domain: &str, module: &str) -> String {
    format!("{domain}/{module}/{MODULE_STATE_FILE}")
}

pub fn collection_manifest_path(domain: &str, module: &str) -> String {
    format!("{domain}/{module}/{COLLECTION_MANIFEST_FILE}")
}

pub fn publish_intent_path(domain: &str, module: &str) -> String {
    format!("{domain}/{module}/{PUBLISH_INTENT_FILE}")
}

pub fn publish_complete_path(domain: &str, module: &str) -> String {
    format!("{domain}/{module}/{PUBLISH_COMPLETE_FILE}")
}

/// `market/universe/snapshot.json` -> `market/universe`.
pub fn parent_dir(rel: &str) -> &str {
    rel.rsplit_once('/').map(|(d, _)| d).unwrap_or("")
}
