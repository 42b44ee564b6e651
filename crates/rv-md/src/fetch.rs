use std::time::Duration;

use chrono::Utc;
use rv_config::FetchConfig;
use tracing::{debug, warn};

use crate::budget::RequestBudget;
use crate::provider::{Provider, ProviderError, RawPayload};

#[derive(Debug, Clone, Copy)]
pub struct FetchPolicy {
    pub timeout: Duration,
    pub retries: u32,
    pub backoff: Duration,
}

impl From<&FetchConfig> for FetchPolicy {
    fn from(cfg: &FetchConfig) -> Self {
        Self {
            timeout: Duration::from_millis(cfg.timeout_ms),
            retries: cfg.retries,
            backoff: Duration::from_millis(cfg.backoff_ms),
        }
    }
}

impl Default for FetchPolicy {
    fn default() -> Self {
        (&FetchConfig::default()).into()
    }
}

/// One provider call under the budget, the timeout and the retry policy.
///
/// The budget is charged per attempt. Non-retryable errors return immediately.
pub async fn fetch_with_policy(
    module: &str,
    provider: &dyn Provider,
    budget: Option<&RequestBudget>,
    policy: FetchPolicy,
) -> Result<RawPayload, ProviderError> {
    let mut attempt: u32 = 0;
    loop {
        if let Some(b) = budget {
            b.try_acquire(Utc::now())?;
        }

        let result = match tokio::time::timeout(policy.timeout, provider.fetch()).await {
            Ok(r) => r,
            Err(_) => Err(ProviderError::Timeout {
                after_ms: policy.timeout.as_millis() as u64,
            }),
        };

        match result {
            Ok(payload) => {
                debug!(module, source = provider.source_name(), records = payload.records.len(), "fetched");
                return Ok(payload);
            }
            Err(e) if e.is_retryable() && attempt < policy.retries => {
                attempt += 1;
                warn!(module, attempt, error = %e, "fetch failed, retrying");
                tokio::time::sleep(policy.backoff * attempt).await;
            }
            Err(e) => return Err(e),
        }
    }
}
