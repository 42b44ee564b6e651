use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Two-phase publish marker. `publish_intent.json` is written before the pair,
/// `publish_complete.json` after it, both carrying the same `run_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishMarker {
    pub run_id: String,
    pub module: String,
    pub at: DateTime<Utc>,
    #[serde(default)]
    pub digest: Option<String>,
}

impl PublishMarker {
    /// A complete marker closes an intent only when the run ids match.
    pub fn closes(&self, intent: &PublishMarker) -> bool {
        self.run_id == intent.run_id && self.module == intent.module
    }
}
