mod fetcher;
mod parser;

pub use fetcher::{FeedSource, HttpFeedFetcher};
pub use parser::RssFeed;
#[cfg(test)]
pub use parser::RssItem;
