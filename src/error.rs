use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Feed server returned HTTP {0}")]
    HttpStatus(reqwest::StatusCode),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Invalid duration {0:?}")]
    InvalidDuration(String),

    #[error("Invalid limit {0:?}")]
    InvalidLimit(String),

    #[error("Invalid feed URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("No user is logged in, run `register <name>` or `login <name>` first")]
    NotLoggedIn,

    #[error("User {0} doesn't exist")]
    UserNotFound(String),

    #[error("User {0} already exists")]
    UserExists(String),

    #[error("Feed {0} doesn't exist")]
    FeedNotFound(String),

    #[error("Feed {0} already exists")]
    FeedExists(String),

    #[error("Already following {0}")]
    AlreadyFollowing(String),

    #[error("Not following {0}")]
    NotFollowing(String),

    #[error("No feed to fetch")]
    NoFeedToFetch,

    #[error("Error fetching the feed {url}: {source}")]
    FeedFetch {
        url: String,
        #[source]
        source: Box<AppError>,
    },

    #[error("Cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;
