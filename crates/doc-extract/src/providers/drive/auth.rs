//! Access tokens for the Drive API
//!
//! Either a ready token from the environment, or an authorized-user token file
//! whose refresh token is exchanged for short-lived access tokens.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::error::{Error, Result};

/// Refresh this long before the reported expiry
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Source of bearer tokens for Drive requests
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String>;
}

/// A fixed token, typically from `DRIVE_ACCESS_TOKEN`
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl AccessTokenProvider for StaticToken {
    async fn access_token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Contents of an authorized-user token file
#[derive(Deserialize)]
struct AuthorizedUserFile {
    client_id: String,
    client_secret: String,
    refresh_token: String,
    #[serde(default)]
    token_uri: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

/// Refreshes access tokens from an authorized-user token file
pub struct AuthorizedUserToken {
    token_file: PathBuf,
    token_uri: String,
    http: reqwest::Client,
    token: Arc<RwLock<Option<CachedToken>>>,
}

impl AuthorizedUserToken {
    pub fn new(
        token_file: impl Into<PathBuf>,
        token_uri: impl Into<String>,
        http: reqwest::Client,
    ) -> Result<Self> {
        let token_file = token_file.into();
        if !token_file.exists() {
            return Err(Error::Config(format!(
                "Drive token file not found: {}",
                token_file.display()
            )));
        }

        Ok(Self {
            token_file,
            token_uri: token_uri.into(),
            http,
            token: Arc::new(RwLock::new(None)),
        })
    }

    async fn refresh(&self) -> Result<CachedToken> {
        let raw = tokio::fs::read_to_string(&self.token_file).await.map_err(|e| {
            Error::Config(format!(
                "Failed to read Drive token file {}: {}",
                self.token_file.display(),
                e
            ))
        })?;
        let creds: AuthorizedUserFile = serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("Invalid Drive token file: {}", e)))?;

        let token_uri = creds.token_uri.as_deref().unwrap_or(&self.token_uri);
        let response = self
            .http
            .post(token_uri)
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", creds.client_id.as_str()),
                ("client_secret", creds.client_secret.as_str()),
                ("refresh_token", creds.refresh_token.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::Connectivity {
                service: "oauth".to_string(),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Config(format!(
                "Token refresh failed ({}): {}",
                status, body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::Config(format!("Failed to parse token response: {}", e)))?;

        Ok(CachedToken {
            access_token: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        })
    }
}

#[async_trait]
impl AccessTokenProvider for AuthorizedUserToken {
    async fn access_token(&self) -> Result<String> {
        {
            let token = self.token.read().await;
            if let Some(ref cached) = *token {
                if cached.expires_at > Instant::now() + EXPIRY_MARGIN {
                    return Ok(cached.access_token.clone());
                }
            }
        }

        let fresh = self.refresh().await?;
        tracing::debug!("Refreshed Drive access token");

        let mut token = self.token.write().await;
        *token = Some(fresh.clone());
        Ok(fresh.access_token)
    }
}
