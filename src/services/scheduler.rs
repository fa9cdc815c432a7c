use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::feed::FeedSource;
use crate::shutdown::Shutdown;

use super::ingest::{IngestReport, Ingestor};

/// Fetches one feed per tick, always the one that has waited longest.
///
/// Ticks run back to back on a single task, so the feed chosen by a tick
/// always sees the `last_fetched_at` written by the previous one. Running two
/// schedulers against the same database would race on that claim.
pub struct FetchScheduler<S> {
    repository: Repository,
    source: S,
    ingestor: Ingestor,
    interval: Duration,
}

impl<S: FeedSource> FetchScheduler<S> {
    pub fn new(repository: Repository, source: S, interval: Duration) -> Self {
        let ingestor = Ingestor::new(repository.clone());
        Self {
            repository,
            source,
            ingestor,
            interval,
        }
    }

    /// Run ticks until shutdown is requested. The first tick fires
    /// immediately. Failures are logged and never end the loop.
    pub async fn run(&self, mut shutdown: Shutdown) {
        let mut timer = tokio::time::interval(self.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!("Fetch scheduler started, one feed every {:?}", self.interval);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.requested() => break,
                _ = timer.tick() => {}
            }

            match self.tick(&shutdown).await {
                Ok(_) => {}
                Err(AppError::NoFeedToFetch) => tracing::warn!("No feed to fetch"),
                Err(AppError::Cancelled) => tracing::debug!("Tick cancelled by shutdown"),
                Err(e) => tracing::error!("Error while scraping feeds: {}", e),
            }
        }

        tracing::info!("Fetch scheduler stopped");
    }

    /// One fetch cycle: claim the next feed, fetch it, ingest its items.
    ///
    /// The feed is marked fetched before the request goes out, so a feed
    /// that keeps failing moves to the back of the queue like any other.
    pub async fn tick(&self, shutdown: &Shutdown) -> Result<IngestReport> {
        let next = self
            .repository
            .next_feed_to_fetch()
            .await?
            .ok_or(AppError::NoFeedToFetch)?;

        let feed = self.repository.mark_feed_fetched(next.id).await?;
        tracing::debug!("Fetching {} ({})", feed.name, feed.url);

        let parsed = self
            .source
            .fetch(&feed.url, shutdown)
            .await
            .map_err(|e| match e {
                AppError::Cancelled => AppError::Cancelled,
                e => AppError::FeedFetch {
                    url: feed.url.clone(),
                    source: Box::new(e),
                },
            })?;

        Ok(self.ingestor.ingest(&parsed, &feed).await)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use chrono::{DateTime, TimeZone, Utc};

    use super::*;
    use crate::feed::{RssFeed, RssItem};
    use crate::models::Feed;
    use crate::shutdown;
    use crate::test_helpers::{create_test_repository, seed_feed, seed_user};

    /// Serves canned feeds by URL and records, for every request, the
    /// `last_fetched_at` the database held at that moment.
    struct StubSource {
        repository: Repository,
        feeds: HashMap<String, RssFeed>,
        requests: Mutex<Vec<(String, Option<DateTime<Utc>>)>>,
    }

    impl StubSource {
        fn new(repository: Repository) -> Self {
            Self {
                repository,
                feeds: HashMap::new(),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn serving(mut self, url: &str, links: &[&str]) -> Self {
            let items = links
                .iter()
                .map(|link| RssItem {
                    title: format!("Post {link}"),
                    link: link.to_string(),
                    description: String::new(),
                    pub_date: String::new(),
                })
                .collect();
            self.feeds.insert(
                url.to_string(),
                RssFeed {
                    title: url.to_string(),
                    items,
                    ..Default::default()
                },
            );
            self
        }

        fn requested_urls(&self) -> Vec<String> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .map(|(url, _)| url.clone())
                .collect()
        }
    }

    impl FeedSource for StubSource {
        async fn fetch(&self, url: &str, _shutdown: &Shutdown) -> Result<RssFeed> {
            let stored = self.repository.get_feed_by_url(url).await?;
            let last_fetched_at = stored.and_then(|f| f.last_fetched_at);
            self.requests
                .lock()
                .unwrap()
                .push((url.to_string(), last_fetched_at));

            self.feeds
                .get(url)
                .cloned()
                .ok_or(AppError::HttpStatus(reqwest::StatusCode::INTERNAL_SERVER_ERROR))
        }
    }

    async fn reload(repository: &Repository, feed: &Feed) -> Feed {
        repository.get_feed(feed.id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn never_fetched_feed_goes_first_then_the_oldest() {
        let (_dir, repository) = create_test_repository().await;
        let alice = seed_user(&repository, "alice").await;
        let a = seed_feed(&repository, &alice, "A", "https://a.example/rss").await;
        let b = seed_feed(&repository, &alice, "B", "https://b.example/rss").await;
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        repository.mark_feed_fetched_at(b.id, t).await.unwrap();

        let source = StubSource::new(repository.clone())
            .serving(&a.url, &["https://a.example/1"])
            .serving(&b.url, &["https://b.example/1"]);
        let scheduler = FetchScheduler::new(repository.clone(), source, Duration::from_secs(60));
        let (_trigger, shutdown) = shutdown::channel();

        scheduler.tick(&shutdown).await.unwrap();
        let a_after = reload(&repository, &a).await;
        assert!(a_after.last_fetched_at.unwrap() > t);

        scheduler.tick(&shutdown).await.unwrap();
        assert_eq!(scheduler.source.requested_urls(), vec![a.url.clone(), b.url.clone()]);
    }

    #[tokio::test]
    async fn feed_is_claimed_before_the_fetch_even_when_it_fails() {
        let (_dir, repository) = create_test_repository().await;
        let alice = seed_user(&repository, "alice").await;
        let broken = seed_feed(&repository, &alice, "Broken", "https://broken.example/rss").await;
        let healthy = seed_feed(&repository, &alice, "Healthy", "https://ok.example/rss").await;

        let source = StubSource::new(repository.clone()).serving(&healthy.url, &[]);
        let scheduler = FetchScheduler::new(repository.clone(), source, Duration::from_secs(60));
        let (_trigger, shutdown) = shutdown::channel();

        let err = scheduler.tick(&shutdown).await.unwrap_err();
        assert!(matches!(err, AppError::FeedFetch { ref url, .. } if url == &broken.url));

        let requests = scheduler.source.requests.lock().unwrap().clone();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].1.is_some(), "feed was not marked before fetching");
        assert!(reload(&repository, &broken).await.last_fetched_at.is_some());

        // The failing feed does not monopolise the next tick.
        scheduler.tick(&shutdown).await.unwrap();
        assert_eq!(scheduler.source.requested_urls()[1], healthy.url);
    }

    #[tokio::test]
    async fn refetching_unchanged_content_stores_each_link_once() {
        let (_dir, repository) = create_test_repository().await;
        let alice = seed_user(&repository, "alice").await;
        let feed = seed_feed(&repository, &alice, "Blog", "https://example.com/rss").await;
        repository.create_feed_follow(&alice, &feed).await.unwrap();

        let source = StubSource::new(repository.clone()).serving(
            &feed.url,
            &["https://example.com/same", "https://example.com/same"],
        );
        let scheduler = FetchScheduler::new(repository.clone(), source, Duration::from_secs(60));
        let (_trigger, shutdown) = shutdown::channel();

        let first = scheduler.tick(&shutdown).await.unwrap();
        let second = scheduler.tick(&shutdown).await.unwrap();

        assert_eq!((first.created, first.duplicates), (1, 1));
        assert_eq!((second.created, second.duplicates), (0, 2));
        let posts = repository.posts_for_user(alice.id, 10).await.unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].url, "https://example.com/same");
    }

    #[tokio::test]
    async fn tick_without_feeds_reports_no_feed() {
        let (_dir, repository) = create_test_repository().await;
        let scheduler = FetchScheduler::new(
            repository.clone(),
            StubSource::new(repository.clone()),
            Duration::from_secs(60),
        );
        let (_trigger, shutdown) = shutdown::channel();

        let err = scheduler.tick(&shutdown).await.unwrap_err();
        assert!(matches!(err, AppError::NoFeedToFetch));
    }

    #[tokio::test]
    async fn loop_survives_empty_ticks_and_stops_on_shutdown() {
        let (_dir, repository) = create_test_repository().await;
        let scheduler = FetchScheduler::new(
            repository.clone(),
            StubSource::new(repository.clone()),
            Duration::from_millis(10),
        );
        let (trigger, shutdown) = shutdown::channel();

        let stopper = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.trigger();
        };
        let finished = tokio::time::timeout(Duration::from_secs(5), async {
            tokio::join!(scheduler.run(shutdown), stopper);
        })
        .await;

        assert!(finished.is_ok(), "scheduler did not stop");
    }

    #[tokio::test]
    async fn loop_processes_one_feed_per_tick() {
        let (_dir, repository) = create_test_repository().await;
        let alice = seed_user(&repository, "alice").await;
        let a = seed_feed(&repository, &alice, "A", "https://a.example/rss").await;
        let b = seed_feed(&repository, &alice, "B", "https://b.example/rss").await;

        let source = StubSource::new(repository.clone())
            .serving(&a.url, &[])
            .serving(&b.url, &[]);
        let scheduler = FetchScheduler::new(repository.clone(), source, Duration::from_secs(1));
        let (trigger, shutdown) = shutdown::channel();

        // Long enough for the immediate first tick, short of the second.
        let stopper = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.trigger();
        };
        tokio::join!(scheduler.run(shutdown), stopper);

        assert_eq!(scheduler.source.requested_urls(), vec![a.url.clone()]);
        assert!(reload(&repository, &b).await.last_fetched_at.is_none());
    }
}
