use reqwest::{Client, ClientBuilder};

use crate::error::{AppError, Result};
use crate::shutdown::Shutdown;

use super::parser::{parse_feed, RssFeed};

const USER_AGENT: &str = "gator";

/// Somewhere feeds can be fetched from.
pub trait FeedSource {
    /// Fetch and decode the feed at `url`. Returns `AppError::Cancelled` if
    /// shutdown is requested before the document has been downloaded.
    async fn fetch(&self, url: &str, shutdown: &Shutdown) -> Result<RssFeed>;
}

pub struct HttpFeedFetcher {
    client: Client,
}

impl HttpFeedFetcher {
    pub fn new() -> Result<Self> {
        Ok(Self::with_client(client_builder().build()?))
    }

    fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(AppError::HttpStatus(response.status()));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

impl FeedSource for HttpFeedFetcher {
    async fn fetch(&self, url: &str, shutdown: &Shutdown) -> Result<RssFeed> {
        let mut shutdown = shutdown.clone();
        if shutdown.is_requested() {
            return Err(AppError::Cancelled);
        }

        let body = tokio::select! {
            biased;
            _ = shutdown.requested() => return Err(AppError::Cancelled),
            body = self.download(url) => body?,
        };

        let feed = parse_feed(&body)?;
        tracing::debug!("Fetched {} items from {}", feed.items.len(), url);
        Ok(feed)
    }
}

fn client_builder() -> ClientBuilder {
    Client::builder().user_agent(USER_AGENT)
}
