use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::StatusCode;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use super::models::{ApiUser, Meeting, RecordingsPage};
use crate::auth::TokenSource;
use crate::catalog::{RecordingSource, UserRef};
use crate::config::ZoomConfig;
use crate::error::{NotFoundError, ProviderError};

/// Largest page Zoom accepts for the recordings listing.
pub const PAGE_SIZE: u32 = 300;

pub struct ZoomClient {
    client: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn TokenSource>,
}

impl ZoomClient {
    pub fn new(config: &ZoomConfig, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            tokens,
        }
    }

    async fn get(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<(StatusCode, String), ProviderError> {
        let credential = self.tokens.get_token().await?;
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&credential.access_token)
            .query(query)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        Ok((status, body))
    }
}

#[async_trait]
impl RecordingSource for ZoomClient {
    async fn resolve_user(&self, email: &str) -> Result<UserRef, ProviderError> {
        let path = format!("/users/{}", urlencoding::encode(email));
        let (status, body) = self.get(&path, &[]).await?;

        if status == StatusCode::NOT_FOUND {
            return Err(NotFoundError {
                email: email.to_string(),
            }
            .into());
        }
        if !status.is_success() {
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let user: ApiUser =
            serde_json::from_str(&body).map_err(|err| ProviderError::Malformed(err.to_string()))?;

        Ok(UserRef {
            display_name: user.display_name(),
            email: user.email.unwrap_or_else(|| email.to_string()),
            id: user.id,
        })
    }

    async fn list_recordings(
        &self,
        user: &UserRef,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Meeting>, ProviderError> {
        let path = format!("/users/{}/recordings", urlencoding::encode(&user.id));
        let mut meetings = Vec::new();
        let mut page_token: Option<String> = None;
        let mut seen_tokens = HashSet::new();

        loop {
            let mut query = vec![
                ("from", from.format("%Y-%m-%d").to_string()),
                ("to", to.format("%Y-%m-%d").to_string()),
                ("page_size", PAGE_SIZE.to_string()),
            ];
            if let Some(token) = &page_token {
                query.push(("next_page_token", token.clone()));
            }

            let (status, body) = self.get(&path, &query).await?;
            if !status.is_success() {
                return Err(ProviderError::Status {
                    status: status.as_u16(),
                    body,
                });
            }

            let page: RecordingsPage = serde_json::from_str(&body)
                .map_err(|err| ProviderError::Malformed(err.to_string()))?;
            debug!(
                "Fetched {} meetings (total_records: {:?})",
                page.meetings.len(),
                page.total_records
            );
            meetings.extend(page.meetings);

            match page.next_page_token.filter(|token| !token.is_empty()) {
                Some(token) => {
                    if !seen_tokens.insert(token.clone()) {
                        return Err(ProviderError::Malformed(format!(
                            "pagination token repeated: {token}"
                        )));
                    }
                    page_token = Some(token);
                }
                None => break,
            }
        }

        Ok(meetings)
    }
}
