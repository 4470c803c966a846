//! Bearer token acquisition
//!
//! The token is fetched once per run, before the first query, and attached
//! to every monitoring request. It is assumed to outlive the run.

use crate::config::AuthConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Source of the bearer token sent to the monitoring API.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Token to attach, or `None` to send requests unauthenticated.
    async fn bearer_token(&self) -> Result<Option<String>>;
}

/// Fixed token.
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn bearer_token(&self) -> Result<Option<String>> {
        if self.0.trim().is_empty() {
            anyhow::bail!("Static token is empty");
        }
        Ok(Some(self.0.clone()))
    }
}

/// No authentication.
pub struct NoAuth;

#[async_trait]
impl TokenProvider for NoAuth {
    async fn bearer_token(&self) -> Result<Option<String>> {
        Ok(None)
    }
}

#[derive(Debug, Deserialize)]
struct MetadataTokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Service-account token from the compute metadata server.
pub struct MetadataServerToken {
    http: reqwest::Client,
    endpoint: String,
    scopes: Vec<String>,
}

impl MetadataServerToken {
    pub fn new(endpoint: impl Into<String>, scopes: Vec<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            scopes,
        })
    }

    fn token_url(&self) -> String {
        format!(
            "{}/computeMetadata/v1/instance/service-accounts/default/token",
            self.endpoint.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl TokenProvider for MetadataServerToken {
    async fn bearer_token(&self) -> Result<Option<String>> {
        let mut request = self
            .http
            .get(self.token_url())
            .header("Metadata-Flavor", "Google");
        if !self.scopes.is_empty() {
            request = request.query(&[("scopes", self.scopes.join(","))]);
        }

        let response = request
            .send()
            .await
            .context("Failed to reach the metadata server")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Metadata server returned {}: {}", status, body.trim());
        }

        let token: MetadataTokenResponse = response
            .json()
            .await
            .context("Invalid token response from metadata server")?;
        tracing::debug!("Obtained access token (expires in {:?}s)", token.expires_in);
        Ok(Some(token.access_token))
    }
}

/// Build the provider selected by the auth configuration.
pub fn from_config(auth: &AuthConfig) -> Result<Arc<dyn TokenProvider>> {
    Ok(match auth {
        AuthConfig::MetadataServer { endpoint, scopes } => {
            Arc::new(MetadataServerToken::new(endpoint.clone(), scopes.clone())?)
        }
        AuthConfig::Static { token } => Arc::new(StaticToken::new(token.clone())),
        AuthConfig::None => Arc::new(NoAuth),
    })
}
