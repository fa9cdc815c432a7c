use tempfile::TempDir;

use crate::app::App;
use crate::config::Config;
use crate::db::Repository;
use crate::models::{Feed, NewFeed, User};
use crate::shutdown::{self, ShutdownTrigger};

/// Create a repository backed by a database file in a fresh temp directory.
/// Keep the `TempDir` alive for as long as the repository is used.
pub async fn create_test_repository() -> (TempDir, Repository) {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
    let db_path = temp_dir.path().join("test.db");
    let repository = Repository::new(&format!("sqlite://{}", db_path.display()))
        .await
        .expect("Failed to open test database");
    (temp_dir, repository)
}

/// An `App` whose config file and database both live in a temp directory.
pub async fn create_test_app() -> (TempDir, App, ShutdownTrigger) {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
    let db_path = temp_dir.path().join("test.db");
    std::fs::write(
        temp_dir.path().join("config.json"),
        serde_json::json!({ "db_url": db_path.to_string_lossy() }).to_string(),
    )
    .expect("Failed to write test config");

    let config = Config::load_from(temp_dir.path().join("config.json"))
        .expect("Failed to load test config");
    let (trigger, shutdown) = shutdown::channel();
    let app = App::new(config, shutdown)
        .await
        .expect("Failed to create test app");
    (temp_dir, app, trigger)
}

pub async fn seed_user(repository: &Repository, name: &str) -> User {
    repository
        .create_user(name)
        .await
        .expect("Failed to create user")
}

pub async fn seed_feed(repository: &Repository, owner: &User, name: &str, url: &str) -> Feed {
    repository
        .create_feed(NewFeed {
            name: name.to_string(),
            url: url.to_string(),
            user_id: owner.id,
        })
        .await
        .expect("Failed to create feed")
}

/// A minimal RSS 2.0 document. Each item is `(title, link, pub_date)`.
pub fn rss_document(channel_title: &str, items: &[(&str, &str, &str)]) -> String {
    let items: String = items
        .iter()
        .map(|(title, link, pub_date)| {
            format!(
                "<item><title>{title}</title><link>{link}</link>\
                 <description>About {title}</description><pubDate>{pub_date}</pubDate></item>"
            )
        })
        .collect();

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
<channel>
<title>{channel_title}</title>
<link>https://example.com/</link>
<description>Test feed</description>
{items}
</channel>
</rss>"#
    )
}
