//! Authenticated profile page fetching.

mod models;

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{REFERER, USER_AGENT};
use tracing::{debug, instrument};

use crate::error::FetchError;
use crate::model::VideoItem;
use crate::signer::SignedRequest;

use models::ItemListResponse;

/// Fetches one page of a profile's posts given a freshly signed request.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(
        &self,
        request: &SignedRequest,
        page_size: usize,
    ) -> Result<Vec<VideoItem>, FetchError>;
}

#[async_trait]
impl<F: PageFetcher + ?Sized> PageFetcher for Arc<F> {
    async fn fetch(
        &self,
        request: &SignedRequest,
        page_size: usize,
    ) -> Result<Vec<VideoItem>, FetchError> {
        (**self).fetch(request, page_size).await
    }
}

/// [`PageFetcher`] for the platform's item list API.
#[derive(Debug, Clone)]
pub struct ProfileFetcher {
    client: Client,
    referer: Option<String>,
}

impl ProfileFetcher {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            referer: None,
        }
    }

    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }

    /// Decodes an item list body, keeping at most `page_size` items.
    pub fn parse_item_list(body: &str, page_size: usize) -> Result<Vec<VideoItem>, FetchError> {
        let response: ItemListResponse = serde_json::from_str(body)?;
        if response.status_code != 0 {
            return Err(FetchError::empty(format!(
                "platform status {}{}",
                response.status_code,
                response
                    .status_msg
                    .map(|m| format!(": {m}"))
                    .unwrap_or_default()
            )));
        }

        let items = response.item_list.unwrap_or_default();
        if items.is_empty() {
            return Err(FetchError::empty("no items in response"));
        }

        items
            .into_iter()
            .take(page_size)
            .map(|raw| raw.into_video_item())
            .collect()
    }
}

#[async_trait]
impl PageFetcher for ProfileFetcher {
    #[instrument(skip_all, fields(url = %request.signed_url), level = "debug")]
    async fn fetch(
        &self,
        request: &SignedRequest,
        page_size: usize,
    ) -> Result<Vec<VideoItem>, FetchError> {
        let mut builder = self
            .client
            .get(request.signed_url.clone())
            .header(USER_AGENT, &request.user_agent);
        for (name, value) in &request.extra_params {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(referer) = &self.referer {
            builder = builder.header(REFERER, referer);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::empty(format!("HTTP {status}")));
        }

        let body = response.text().await?;
        let items = Self::parse_item_list(&body, page_size)?;
        debug!(count = items.len(), "Fetched profile page");
        Ok(items)
    }
}
