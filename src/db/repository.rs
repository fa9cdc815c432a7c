use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use tokio_rusqlite::Connection;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{Feed, FeedFollow, FeedWithOwner, NewFeed, NewPost, Post, PostInsert, User};

use super::schema::SCHEMA;

const USER_COLUMNS: &str = "u.id, u.name, u.created_at, u.updated_at";
const FEED_COLUMNS: &str =
    "f.id, f.name, f.url, f.user_id, f.created_at, f.updated_at, f.last_fetched_at";
const POST_COLUMNS: &str =
    "p.id, p.title, p.url, p.description, p.published_at, p.feed_id, p.created_at, p.updated_at";

#[derive(Clone)]
pub struct Repository {
    conn: Connection,
}

impl Repository {
    /// Open (or create) the database. Accepts a plain path, a `sqlite://`
    /// URL or `:memory:`.
    pub async fn new(db_url: &str) -> Result<Self> {
        let path = db_url.strip_prefix("sqlite://").unwrap_or(db_url);
        let conn = if path == ":memory:" {
            Connection::open_in_memory().await?
        } else {
            Connection::open(path).await?
        };

        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    // User operations

    pub async fn create_user(&self, name: &str) -> Result<User> {
        let now = now();
        let user = User {
            id: Uuid::new_v4(),
            name: name.to_string(),
            created_at: now,
            updated_at: now,
        };

        let row = user.clone();
        let inserted = self
            .conn
            .call(move |conn| {
                let result = conn.execute(
                    "INSERT INTO users (id, name, created_at, updated_at) VALUES (?1, ?2, ?3, ?4)",
                    params![
                        row.id.to_string(),
                        row.name,
                        timestamp(&row.created_at),
                        timestamp(&row.updated_at),
                    ],
                );
                insert_outcome(result)
            })
            .await?;

        if inserted {
            Ok(user)
        } else {
            Err(AppError::UserExists(user.name))
        }
    }

    pub async fn get_user_by_name(&self, name: &str) -> Result<Option<User>> {
        let name = name.to_string();
        let user = self
            .conn
            .call(move |conn| {
                let user = conn
                    .query_row(
                        &format!("SELECT {USER_COLUMNS} FROM users u WHERE u.name = ?1"),
                        params![name],
                        user_from_row,
                    )
                    .optional()?;
                Ok(user)
            })
            .await?;
        Ok(user)
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        let users = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {USER_COLUMNS} FROM users u ORDER BY u.created_at, u.name"
                ))?;
                let users = stmt
                    .query_map([], user_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(users)
            })
            .await?;
        Ok(users)
    }

    /// Remove every user. Feeds, follows and posts go with them.
    pub async fn delete_all_users(&self) -> Result<usize> {
        let deleted = self
            .conn
            .call(|conn| Ok(conn.execute("DELETE FROM users", [])?))
            .await?;
        Ok(deleted)
    }

    // Feed operations

    pub async fn create_feed(&self, feed: NewFeed) -> Result<Feed> {
        let now = now();
        let feed = Feed {
            id: Uuid::new_v4(),
            name: feed.name,
            url: feed.url,
            user_id: feed.user_id,
            created_at: now,
            updated_at: now,
            last_fetched_at: None,
        };

        let row = feed.clone();
        let inserted = self
            .conn
            .call(move |conn| {
                let result = conn.execute(
                    r#"INSERT INTO feeds (id, name, url, user_id, created_at, updated_at)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
                    params![
                        row.id.to_string(),
                        row.name,
                        row.url,
                        row.user_id.to_string(),
                        timestamp(&row.created_at),
                        timestamp(&row.updated_at),
                    ],
                );
                insert_outcome(result)
            })
            .await?;

        if inserted {
            Ok(feed)
        } else {
            Err(AppError::FeedExists(feed.url))
        }
    }

    pub async fn get_feed(&self, id: Uuid) -> Result<Option<Feed>> {
        let feed = self
            .conn
            .call(move |conn| {
                let feed = conn
                    .query_row(
                        &format!("SELECT {FEED_COLUMNS} FROM feeds f WHERE f.id = ?1"),
                        params![id.to_string()],
                        feed_from_row,
                    )
                    .optional()?;
                Ok(feed)
            })
            .await?;
        Ok(feed)
    }

    pub async fn get_feed_by_url(&self, url: &str) -> Result<Option<Feed>> {
        let url = url.to_string();
        let feed = self
            .conn
            .call(move |conn| {
                let feed = conn
                    .query_row(
                        &format!("SELECT {FEED_COLUMNS} FROM feeds f WHERE f.url = ?1"),
                        params![url],
                        feed_from_row,
                    )
                    .optional()?;
                Ok(feed)
            })
            .await?;
        Ok(feed)
    }

    pub async fn list_feeds(&self) -> Result<Vec<FeedWithOwner>> {
        let feeds = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT f.name, f.url, u.name
                       FROM feeds f
                       JOIN users u ON f.user_id = u.id
                       ORDER BY f.created_at"#,
                )?;
                let feeds = stmt
                    .query_map([], |row| {
                        Ok(FeedWithOwner {
                            name: row.get(0)?,
                            url: row.get(1)?,
                            owner: row.get(2)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(feeds)
            })
            .await?;
        Ok(feeds)
    }

    /// The feed that has waited longest: never-fetched feeds first, then the
    /// oldest `last_fetched_at`.
    pub async fn next_feed_to_fetch(&self) -> Result<Option<Feed>> {
        let feed = self
            .conn
            .call(|conn| {
                let feed = conn
                    .query_row(
                        &format!(
                            r#"SELECT {FEED_COLUMNS} FROM feeds f
                               ORDER BY f.last_fetched_at ASC NULLS FIRST, f.created_at ASC, f.rowid ASC
                               LIMIT 1"#
                        ),
                        [],
                        feed_from_row,
                    )
                    .optional()?;
                Ok(feed)
            })
            .await?;
        Ok(feed)
    }

    pub async fn mark_feed_fetched(&self, id: Uuid) -> Result<Feed> {
        self.mark_feed_fetched_at(id, now()).await
    }

    pub(crate) async fn mark_feed_fetched_at(&self, id: Uuid, at: DateTime<Utc>) -> Result<Feed> {
        let updated = self
            .conn
            .call(move |conn| {
                let updated = conn.execute(
                    "UPDATE feeds SET last_fetched_at = ?1, updated_at = ?1 WHERE id = ?2",
                    params![timestamp(&at), id.to_string()],
                )?;
                Ok(updated)
            })
            .await?;

        if updated == 0 {
            return Err(AppError::FeedNotFound(id.to_string()));
        }

        self.get_feed(id)
            .await?
            .ok_or_else(|| AppError::FeedNotFound(id.to_string()))
    }

    // Follow operations

    pub async fn create_feed_follow(&self, user: &User, feed: &Feed) -> Result<FeedFollow> {
        let now = now();
        let follow = FeedFollow {
            id: Uuid::new_v4(),
            user_id: user.id,
            feed_id: feed.id,
            created_at: now,
            updated_at: now,
        };

        let row = follow.clone();
        let inserted = self
            .conn
            .call(move |conn| {
                let result = conn.execute(
                    r#"INSERT INTO feed_follows (id, user_id, feed_id, created_at, updated_at)
                       VALUES (?1, ?2, ?3, ?4, ?5)"#,
                    params![
                        row.id.to_string(),
                        row.user_id.to_string(),
                        row.feed_id.to_string(),
                        timestamp(&row.created_at),
                        timestamp(&row.updated_at),
                    ],
                );
                insert_outcome(result)
            })
            .await?;

        if inserted {
            Ok(follow)
        } else {
            Err(AppError::AlreadyFollowing(feed.url.clone()))
        }
    }

    pub async fn feeds_followed_by(&self, user_id: Uuid) -> Result<Vec<Feed>> {
        let feeds = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    r#"SELECT {FEED_COLUMNS}
                       FROM feeds f
                       JOIN feed_follows ff ON ff.feed_id = f.id
                       WHERE ff.user_id = ?1
                       ORDER BY ff.created_at"#
                ))?;
                let feeds = stmt
                    .query_map(params![user_id.to_string()], feed_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(feeds)
            })
            .await?;
        Ok(feeds)
    }

    /// Returns `false` when the user was not following the feed.
    pub async fn delete_feed_follow(&self, user_id: Uuid, feed_url: &str) -> Result<bool> {
        let feed_url = feed_url.to_string();
        let deleted = self
            .conn
            .call(move |conn| {
                let deleted = conn.execute(
                    r#"DELETE FROM feed_follows
                       WHERE user_id = ?1
                         AND feed_id IN (SELECT id FROM feeds WHERE url = ?2)"#,
                    params![user_id.to_string(), feed_url],
                )?;
                Ok(deleted)
            })
            .await?;
        Ok(deleted > 0)
    }

    // Post operations

    pub async fn create_post(&self, post: NewPost) -> Result<PostInsert> {
        let now = now();
        let inserted = self
            .conn
            .call(move |conn| {
                let result = conn.execute(
                    r#"INSERT INTO posts (id, title, url, description, published_at, feed_id, created_at, updated_at)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)"#,
                    params![
                        Uuid::new_v4().to_string(),
                        post.title,
                        post.url,
                        post.description,
                        post.published_at.as_ref().map(timestamp),
                        post.feed_id.to_string(),
                        timestamp(&now),
                    ],
                );
                insert_outcome(result)
            })
            .await?;

        Ok(if inserted {
            PostInsert::Created
        } else {
            PostInsert::Duplicate
        })
    }

    /// Newest posts across every feed the user follows.
    pub async fn posts_for_user(&self, user_id: Uuid, limit: u32) -> Result<Vec<Post>> {
        let posts = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    r#"SELECT {POST_COLUMNS}
                       FROM posts p
                       JOIN feed_follows ff ON ff.feed_id = p.feed_id
                       WHERE ff.user_id = ?1
                       ORDER BY p.published_at DESC NULLS LAST, p.created_at DESC
                       LIMIT ?2"#
                ))?;
                let posts = stmt
                    .query_map(params![user_id.to_string(), limit], post_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(posts)
            })
            .await?;
        Ok(posts)
    }
}

/// Current time at the precision the database keeps, so a record compares
/// equal to itself after a round trip.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn insert_outcome(result: rusqlite::Result<usize>) -> tokio_rusqlite::Result<bool> {
    match result {
        Ok(_) => Ok(true),
        Err(e) if is_unique_violation(&e) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

fn parse_datetime(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn get_datetime(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_datetime(idx, &raw)
}

fn get_optional_datetime(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    row.get::<_, Option<String>>(idx)?
        .map(|raw| parse_datetime(idx, &raw))
        .transpose()
}

fn get_uuid(row: &Row, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: get_uuid(row, 0)?,
        name: row.get(1)?,
        created_at: get_datetime(row, 2)?,
        updated_at: get_datetime(row, 3)?,
    })
}

fn feed_from_row(row: &Row) -> rusqlite::Result<Feed> {
    Ok(Feed {
        id: get_uuid(row, 0)?,
        name: row.get(1)?,
        url: row.get(2)?,
        user_id: get_uuid(row, 3)?,
        created_at: get_datetime(row, 4)?,
        updated_at: get_datetime(row, 5)?,
        last_fetched_at: get_optional_datetime(row, 6)?,
    })
}

fn post_from_row(row: &Row) -> rusqlite::Result<Post> {
    Ok(Post {
        id: get_uuid(row, 0)?,
        title: row.get(1)?,
        url: row.get(2)?,
        description: row.get(3)?,
        published_at: get_optional_datetime(row, 4)?,
        feed_id: get_uuid(row, 5)?,
        created_at: get_datetime(row, 6)?,
        updated_at: get_datetime(row, 7)?,
    })
}
