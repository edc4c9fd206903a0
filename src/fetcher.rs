use crate::types::{CollectorError, Result};
use async_trait::async_trait;
use rss::Channel;
use tracing::{debug, info};

/// Seam between the orchestrator and the network. Implementations return the
/// parsed channel tree for one feed URL.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FetchFeed: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Channel>;
}

/// HTTP feed fetcher. A non-success status or transport failure yields a
/// fetch error; a body that is not a well-formed feed yields a parse error.
/// Both are terminal for the single source being processed.
pub struct FeedFetcher {
    client: reqwest::Client,
}

impl FeedFetcher {
    pub fn new() -> Self {
        // Transport-default timeouts on purpose: feed bridges can be slow to
        // respond right after waking up.
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for FeedFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FetchFeed for FeedFetcher {
    async fn fetch(&self, url: &str) -> Result<Channel> {
        debug!("fetching feed: {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| CollectorError::Fetch {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let body = response.bytes().await.map_err(|e| CollectorError::Fetch {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let channel = Channel::read_from(&body[..]).map_err(|e| CollectorError::Parse {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        info!("fetched feed {} ({} items)", url, channel.items().len());
        Ok(channel)
    }
}
