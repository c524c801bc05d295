//! Remote activity source
//!
//! The archive treats the remote API as a paginated fetch function. The trait
//! keeps the orchestrator testable; [`HttpActivitySource`] talks to a
//! Strava-compatible `/athlete/activities` endpoint.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::activity::Activity;
use crate::error::SourceError;

/// One page request. Times are epoch seconds, pages are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageQuery {
    pub after: Option<i64>,
    pub before: Option<i64>,
    pub page: u32,
    pub per_page: u32,
}

/// Paginated activity fetch (allows mocking in tests)
///
/// An empty page signals the end of pagination.
#[async_trait]
pub trait ActivitySource: Send + Sync {
    async fn fetch(
        &self,
        access_token: &str,
        query: &PageQuery,
    ) -> Result<Vec<Activity>, SourceError>;
}

/// HTTP client for the remote activity API
pub struct HttpActivitySource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpActivitySource {
    pub fn new(base_url: impl Into<String>) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SourceError::Request(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn query_params(query: &PageQuery) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("page", query.page.to_string()),
            ("per_page", query.per_page.to_string()),
        ];
        if let Some(after) = query.after {
            params.push(("after", after.to_string()));
        }
        if let Some(before) = query.before {
            params.push(("before", before.to_string()));
        }
        params
    }
}

#[async_trait]
impl ActivitySource for HttpActivitySource {
    async fn fetch(
        &self,
        access_token: &str,
        query: &PageQuery,
    ) -> Result<Vec<Activity>, SourceError> {
        let url = format!("{}/athlete/activities", self.base_url);
        debug!(url = %url, page = query.page, after = ?query.after, "Fetching activities");

        let response = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .query(&Self::query_params(query))
            .send()
            .await
            .map_err(|e| SourceError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<Vec<Activity>>()
            .await
            .map_err(|e| SourceError::Decode(e.to_string()))
    }
}
