//! Ledger read client
//!
//! Single-key lookups against public mapping storage plus the current
//! network height. Reads are idempotent and safe to retry.

use crate::config::LedgerConfig;
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

/// Read-only access to public ledger state
///
/// `mapping_value` returns `Ok(None)` when the key was never written. A
/// network failure is an `Err`, never a silent `None`.
#[async_trait]
pub trait LedgerReader: Send + Sync {
    /// Current block height
    async fn latest_height(&self) -> Result<u64>;

    /// Raw literal stored under `key` in `mapping`, if any
    async fn mapping_value(&self, mapping: &str, key: &str) -> Result<Option<String>>;
}

/// HTTP client for the public ledger API
///
/// # Example
///
/// ```rust,no_run
/// use privlend_coordinator::{HttpLedgerClient, LedgerConfig, LedgerReader};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = HttpLedgerClient::new(LedgerConfig::default())?;
/// let height = client.latest_height().await?;
/// let counter = client.mapping_value("loan_counter", "0u32").await?;
/// # Ok(())
/// # }
/// ```
pub struct HttpLedgerClient {
    config: LedgerConfig,
    client: Client,
}

impl HttpLedgerClient {
    /// Create a new ledger client
    pub fn new(config: LedgerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    fn network_url(&self) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.network
        )
    }

    async fn get_text(&self, url: &str) -> Result<Option<String>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::ReadFailure(format!("GET {url}: {e}")))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::ReadFailure(format!(
                "GET {url} returned {status}: {body}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::ReadFailure(format!("GET {url}: {e}")))?;
        Ok(Some(body))
    }
}

/// Interpret a mapping response body.
///
/// The API answers with a JSON string literal or `null`; some deployments
/// return the bare literal instead. Anything else is malformed and treated
/// as absent.
fn decode_mapping_body(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return None;
    }

    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(serde_json::Value::String(s)) => Some(s),
        Ok(serde_json::Value::Bool(b)) => Some(b.to_string()),
        Ok(serde_json::Value::Number(n)) => Some(n.to_string()),
        Ok(serde_json::Value::Null) => None,
        Ok(_) => None,
        Err(_) if !trimmed.contains(char::is_whitespace) => Some(trimmed.to_string()),
        Err(_) => None,
    }
}

#[async_trait]
impl LedgerReader for HttpLedgerClient {
    async fn latest_height(&self) -> Result<u64> {
        let url = format!("{}/latest/height", self.network_url());
        let body = self
            .get_text(&url)
            .await?
            .ok_or_else(|| Error::MalformedResponse("latest height not found".to_string()))?;

        let height = serde_json::from_str::<serde_json::Value>(body.trim())
            .ok()
            .and_then(|v| match v {
                serde_json::Value::Number(n) => n.as_u64(),
                serde_json::Value::String(s) => crate::literal::parse_u64(&s),
                _ => None,
            })
            .ok_or_else(|| Error::MalformedResponse(format!("height body: {body}")))?;

        debug!("Latest height: {}", height);
        Ok(height)
    }

    async fn mapping_value(&self, mapping: &str, key: &str) -> Result<Option<String>> {
        let url = format!(
            "{}/program/{}/mapping/{}/{}",
            self.network_url(),
            self.config.program_id,
            mapping,
            key
        );

        let Some(body) = self.get_text(&url).await? else {
            return Ok(None);
        };

        let value = decode_mapping_body(&body);
        if value.is_none() && !matches!(body.trim(), "" | "null") {
            warn!("Malformed value for {}[{}]: {:?}", mapping, key, body);
        }
        Ok(value)
    }
}
