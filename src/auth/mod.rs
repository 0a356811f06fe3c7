//! Zoom server-to-server OAuth token management.
//!
//! The cached credential is refreshed on first use and whenever it is within
//! the configured safety margin of expiry. Failures are returned as-is; the
//! pipeline decides whether to retry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::ZoomConfig;
use crate::error::AuthError;

/// Bearer token plus the instant it stops being valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    /// True when `now` is inside the refresh window before expiry.
    pub fn needs_refresh(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        let margin = chrono::Duration::from_std(margin).unwrap_or(chrono::Duration::zero());
        now + margin >= self.expires_at
    }
}

/// Source of bearer tokens for Zoom API calls.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn get_token(&self) -> Result<Credential, AuthError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

pub struct TokenManager {
    client: reqwest::Client,
    oauth_url: String,
    client_id: Option<String>,
    client_secret: Option<String>,
    account_id: Option<String>,
    margin: Duration,
    cached: Mutex<Option<Credential>>,
}

impl TokenManager {
    pub fn new(config: &ZoomConfig, margin: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            oauth_url: config.oauth_url.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            account_id: config.account_id.clone(),
            margin,
            cached: Mutex::new(None),
        }
    }

    #[cfg(test)]
    async fn prime(&self, credential: Credential) {
        *self.cached.lock().await = Some(credential);
    }

    async fn get_token_at(&self, now: DateTime<Utc>) -> Result<Credential, AuthError> {
        let mut cached = self.cached.lock().await;
        if let Some(credential) = cached.as_ref() {
            if !credential.needs_refresh(now, self.margin) {
                return Ok(credential.clone());
            }
            debug!(
                "Cached Zoom token expires at {}, refreshing",
                credential.expires_at
            );
        }

        let credential = self.request_token(now).await?;
        *cached = Some(credential.clone());
        Ok(credential)
    }

    async fn request_token(&self, now: DateTime<Utc>) -> Result<Credential, AuthError> {
        let client_id = non_empty(&self.client_id).ok_or(AuthError::MissingCredential("client_id"))?;
        let client_secret =
            non_empty(&self.client_secret).ok_or(AuthError::MissingCredential("client_secret"))?;
        let account_id =
            non_empty(&self.account_id).ok_or(AuthError::MissingCredential("account_id"))?;

        let response = self
            .client
            .post(&self.oauth_url)
            .basic_auth(client_id, Some(client_secret))
            .form(&[
                ("grant_type", "account_credentials"),
                ("account_id", account_id),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let token: TokenResponse =
            serde_json::from_str(&body).map_err(|err| AuthError::Malformed(err.to_string()))?;
        if token.access_token.is_empty() {
            return Err(AuthError::Malformed("empty access_token".to_string()));
        }

        let expires_at = now + chrono::Duration::seconds(token.expires_in.max(0));
        info!("Obtained Zoom access token (expires at {})", expires_at);

        Ok(Credential {
            access_token: token.access_token,
            expires_at,
        })
    }
}

#[async_trait]
impl TokenSource for TokenManager {
    async fn get_token(&self) -> Result<Credential, AuthError> {
        self.get_token_at(Utc::now()).await
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}
