use chrono::{DateTime, Utc, Weekday};

use crate::db::Repository;
use crate::feed::RssFeed;
use crate::models::{Feed, NewPost, PostInsert};

/// RFC 1123 with a numeric zone, e.g. `Mon, 02 Jan 2006 15:04:05 -0700`,
/// minus the leading weekday which is checked separately.
const PUB_DATE_FORMAT: &str = "%d %b %Y %H:%M:%S %z";

/// What happened to the items of one fetched feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub created: usize,
    pub duplicates: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Turns fetched feed items into stored posts.
#[derive(Clone)]
pub struct Ingestor {
    repository: Repository,
}

impl Ingestor {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Store every item of `parsed` as a post of `feed`. Items are handled
    /// independently: a failed insert is logged and counted, and the rest
    /// of the feed still goes through.
    pub async fn ingest(&self, parsed: &RssFeed, feed: &Feed) -> IngestReport {
        let mut report = IngestReport::default();

        for item in &parsed.items {
            if item.title.trim().is_empty() {
                tracing::debug!(feed = %feed.name, link = %item.link, "Skipping item without a title");
                report.skipped += 1;
                continue;
            }

            let published_at = parse_pub_date(&item.pub_date);
            if published_at.is_none() && !item.pub_date.trim().is_empty() {
                tracing::debug!(
                    feed = %feed.name,
                    pub_date = %item.pub_date,
                    "Unparsable pubDate, storing post without a publication time"
                );
            }

            let post = NewPost {
                title: item.title.clone(),
                url: item.link.clone(),
                description: Some(item.description.clone()).filter(|d| !d.is_empty()),
                published_at,
                feed_id: feed.id,
            };

            match self.repository.create_post(post).await {
                Ok(PostInsert::Created) => report.created += 1,
                Ok(PostInsert::Duplicate) => {
                    tracing::debug!(feed = %feed.name, link = %item.link, "Post already stored");
                    report.duplicates += 1;
                }
                Err(e) => {
                    tracing::warn!(feed = %feed.name, link = %item.link, "Failed to store post: {}", e);
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            feed = %feed.name,
            created = report.created,
            duplicates = report.duplicates,
            skipped = report.skipped,
            failed = report.failed,
            "{} scraped",
            feed.name
        );

        report
    }
}

/// The weekday has to be a real three-letter name, but feeds often get it
/// wrong for the date, so it is not compared against the date.
fn parse_pub_date(raw: &str) -> Option<DateTime<Utc>> {
    let (weekday, rest) = raw.trim().split_once(", ")?;
    if weekday.len() != 3 || weekday.parse::<Weekday>().is_err() {
        return None;
    }
    DateTime::parse_from_str(rest, PUB_DATE_FORMAT)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
