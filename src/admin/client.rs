//! HTTP client for the admin interface

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{InstallRule, NodeStats, RemovedRule};
use crate::cache::PinnedEntry;
use crate::error::{Error, Result};

/// Default request timeout
pub const DEFAULT_ADMIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Drives a node's admin interface
#[derive(Debug, Clone)]
pub struct AdminClient {
    client: Client,
    base_url: String,
}

impl AdminClient {
    /// Create a client for `base_url`, e.g. `http://127.0.0.1:8080`
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_ADMIN_TIMEOUT)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url })
    }

    /// `ReadRules`
    pub async fn list(&self) -> Result<Vec<PinnedEntry>> {
        let response = self.client.get(self.url("/rules")).send().await?;
        decode(response).await
    }

    /// `InstallRule`
    pub async fn install(&self, key: u32, value: u32) -> Result<PinnedEntry> {
        debug!(key, value, "Installing rule via {}", self.base_url);
        let response = self
            .client
            .post(self.url("/rules"))
            .json(&InstallRule { key, value })
            .send()
            .await?;
        decode(response).await
    }

    /// `RemoveRule`; `None` when no rule was installed for `key`
    pub async fn remove(&self, key: u32) -> Result<Option<RemovedRule>> {
        let response = self
            .client
            .delete(self.url(&format!("/rules/{}", key)))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        decode(response).await.map(Some)
    }

    pub async fn stats(&self) -> Result<NodeStats> {
        let response = self.client.get(self.url("/stats")).send().await?;
        decode(response).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Admin(format!(
            "Admin request failed with status {}: {}",
            status, body
        )));
    }
    Ok(response.json().await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_normalized() {
        let client = AdminClient::new("http://127.0.0.1:8080/").unwrap();
        assert_eq!(client.url("/rules"), "http://127.0.0.1:8080/rules");
    }

    #[tokio::test]
    async fn test_unreachable_admin() {
        let client = AdminClient::new("http://127.0.0.1:1").unwrap();
        assert!(matches!(client.list().await, Err(Error::Http(_))));
    }
}
