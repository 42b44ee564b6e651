//! `system/health_history.json`: one health summary per UTC date.

use chrono::{DateTime, NaiveDate, Utc};
use rv_schemas::{HealthReport, HealthSummary, OverallStatus};
use serde::{Deserialize, Serialize};

pub const HISTORY_DAYS: usize = 30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub date: NaiveDate,
    pub generated_at: DateTime<Utc>,
    pub status: OverallStatus,
    pub summary: HealthSummary,
    #[serde(default)]
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthHistory {
    pub schema_version: String,
    #[serde(default)]
    pub items: Vec<HistoryItem>,
}

impl HealthHistory {
    pub fn empty(schema_version: &str) -> Self {
        Self {
            schema_version: schema_version.to_string(),
            items: Vec::new(),
        }
    }
}

/// Replace the entry for the report's date, keep dates sorted, keep the last
/// [`HISTORY_DAYS`].
pub fn upsert_history(mut history: HealthHistory, report: &HealthReport) -> HealthHistory {
    let date = report.generated_at.date_naive();
    history.items.retain(|i| i.date != date);
    history.items.push(HistoryItem {
        date,
        generated_at: report.generated_at,
        status: report.status,
        summary: report.summary.clone(),
        reasons: report.reasons.clone(),
    });
    history.items.sort_by_key(|i| i.date);
    let excess = history.items.len().saturating_sub(HISTORY_DAYS);
    history.items.drain(..excess);
    history.schema_version = report.schema_version.clone();
    history
}
