use rv_config::SecretValue;
use serde_json::Value;

use crate::provider::{extract_records, Provider, ProviderError, RawPayload};

/// GET a JSON endpoint. The API key (if any) goes in a query parameter and is
/// never logged.
#[derive(Debug, Clone)]
pub struct HttpJsonProvider {
    source: String,
    url: String,
    api_key: Option<(String, SecretValue)>,
    records_pointer: Option<String>,
    http: reqwest::Client,
}

impl HttpJsonProvider {
    pub fn new(source: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            url: url.into(),
            api_key: None,
            records_pointer: None,
            http: reqwest::Client::new(),
        }
    }

    pub fn with_api_key(mut self, param: impl Into<String>, key: SecretValue) -> Self {
        self.api_key = Some((param.into(), key));
        self
    }

    pub fn with_records_pointer(mut self, pointer: Option<String>) -> Self {
        self.records_pointer = pointer;
        self
    }
}

#[async_trait::async_trait]
impl Provider for HttpJsonProvider {
    fn source_name(&self) -> &str {
        &self.source
    }

    async fn fetch(&self) -> Result<RawPayload, ProviderError> {
        let mut req = self.http.get(&self.url);
        if let Some((param, key)) = &self.api_key {
            req = req.query(&[(param.as_str(), key.expose())]);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.without_url().to_string()))?;

        let status = resp.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(ProviderError::Auth {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Http {
                status: status.as_u16(),
                message: message.chars().take(200).collect(),
            });
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.without_url().to_string()))?;
        let records = extract_records(body, self.records_pointer.as_deref())?;
        Ok(RawPayload::new(records))
    }
}
