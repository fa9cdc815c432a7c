use url::Url;

use crate::app::App;
use crate::error::{AppError, Result};
use crate::feed::HttpFeedFetcher;
use crate::models::{NewFeed, User};
use crate::services::FetchScheduler;

use super::duration::parse_duration;

const DEFAULT_BROWSE_LIMIT: u32 = 2;

/// Commands anyone can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublicCommand {
    Register,
    Login,
    Reset,
    Users,
    Agg,
    Feeds,
}

/// Commands that act on behalf of the logged-in user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserCommand {
    AddFeed,
    Follow,
    Following,
    Unfollow,
    Browse,
}

impl PublicCommand {
    pub async fn run(self, app: &mut App, args: &[String]) -> Result<()> {
        match self {
            PublicCommand::Register => register(app, args).await,
            PublicCommand::Login => login(app, args).await,
            PublicCommand::Reset => reset(app).await,
            PublicCommand::Users => users(app).await,
            PublicCommand::Agg => agg(app, args).await,
            PublicCommand::Feeds => feeds(app).await,
        }
    }
}

impl UserCommand {
    pub async fn run(self, app: &mut App, args: &[String], user: &User) -> Result<()> {
        match self {
            UserCommand::AddFeed => add_feed(app, args, user).await,
            UserCommand::Follow => follow(app, args, user).await,
            UserCommand::Following => following(app, user).await,
            UserCommand::Unfollow => unfollow(app, args, user).await,
            UserCommand::Browse => browse(app, args, user).await,
        }
    }
}

async fn register(app: &mut App, args: &[String]) -> Result<()> {
    let name = args.first().ok_or(AppError::Usage("register <name>"))?;

    let user = app.repository.create_user(name).await?;
    app.config.set_user(&user.name)?;

    println!("User {} registered ({})", user.name, user.id);
    Ok(())
}

async fn login(app: &mut App, args: &[String]) -> Result<()> {
    let name = args.first().ok_or(AppError::Usage("login <name>"))?;

    let user = app
        .repository
        .get_user_by_name(name)
        .await?
        .ok_or_else(|| AppError::UserNotFound(name.clone()))?;
    app.config.set_user(&user.name)?;

    println!("Logged in as {}", user.name);
    Ok(())
}

async fn reset(app: &mut App) -> Result<()> {
    let deleted = app.repository.delete_all_users().await?;
    println!("Deleted {} users", deleted);
    Ok(())
}

async fn users(app: &mut App) -> Result<()> {
    let current = app.config.current_user_name.as_deref();
    for user in app.repository.list_users().await? {
        if Some(user.name.as_str()) == current {
            println!("* {} (current)", user.name);
        } else {
            println!("* {}", user.name);
        }
    }
    Ok(())
}

/// Blocks until shutdown is requested.
async fn agg(app: &mut App, args: &[String]) -> Result<()> {
    let raw = args.first().ok_or(AppError::Usage("agg <duration>"))?;
    let interval = parse_duration(raw)?;

    let fetcher = HttpFeedFetcher::new()?;
    let scheduler = FetchScheduler::new(app.repository.clone(), fetcher, interval);

    println!("Collecting feeds every {:?}", interval);
    scheduler.run(app.shutdown.clone()).await;
    Ok(())
}

async fn feeds(app: &mut App) -> Result<()> {
    for feed in app.repository.list_feeds().await? {
        println!(
            "Feed name: {} | Feed URL: {} | Created by: {}",
            feed.name, feed.url, feed.owner
        );
    }
    Ok(())
}

async fn add_feed(app: &mut App, args: &[String], user: &User) -> Result<()> {
    let [name, url, ..] = args else {
        return Err(AppError::Usage("addfeed <name> <url>"));
    };
    validate_feed_url(url)?;

    let feed = app
        .repository
        .create_feed(NewFeed {
            name: name.clone(),
            url: url.clone(),
            user_id: user.id,
        })
        .await?;
    app.repository.create_feed_follow(user, &feed).await?;

    println!("Added feed {} ({}), followed by {}", feed.name, feed.url, user.name);
    Ok(())
}

async fn follow(app: &mut App, args: &[String], user: &User) -> Result<()> {
    let url = args.first().ok_or(AppError::Usage("follow <url>"))?;

    let feed = app
        .repository
        .get_feed_by_url(url)
        .await?
        .ok_or_else(|| AppError::FeedNotFound(url.clone()))?;
    app.repository.create_feed_follow(user, &feed).await?;

    println!("{} now follows {}", user.name, feed.name);
    Ok(())
}

async fn following(app: &mut App, user: &User) -> Result<()> {
    let feeds = app.repository.feeds_followed_by(user.id).await?;
    println!("Current user {} follows the feeds:", user.name);
    for feed in feeds {
        println!("* {} ({})", feed.name, feed.url);
    }
    Ok(())
}

async fn unfollow(app: &mut App, args: &[String], user: &User) -> Result<()> {
    let url = args.first().ok_or(AppError::Usage("unfollow <url>"))?;

    if !app.repository.delete_feed_follow(user.id, url).await? {
        return Err(AppError::NotFollowing(url.clone()));
    }

    println!("{} unfollowed {}", user.name, url);
    Ok(())
}

async fn browse(app: &mut App, args: &[String], user: &User) -> Result<()> {
    let limit = match args.first() {
        Some(raw) => parse_limit(raw)?,
        None => DEFAULT_BROWSE_LIMIT,
    };

    for post in app.repository.posts_for_user(user.id, limit).await? {
        let published = post
            .published_at
            .map(|dt| dt.to_rfc2822())
            .unwrap_or_else(|| "at an unknown time".to_string());
        println!("* {} ({}), published {}", post.title, post.url, published);
        if let Some(description) = &post.description {
            println!("{}", description.trim());
        }
        println!("------------------");
    }
    Ok(())
}

fn parse_limit(raw: &str) -> Result<u32> {
    match raw.parse::<u32>() {
        Ok(limit) if limit > 0 => Ok(limit),
        _ => Err(AppError::InvalidLimit(raw.to_string())),
    }
}

fn validate_feed_url(raw: &str) -> Result<()> {
    let invalid = |reason: &str| AppError::InvalidUrl {
        url: raw.to_string(),
        reason: reason.to_string(),
    };

    let url = Url::parse(raw).map_err(|e| invalid(&e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(invalid(&format!("unsupported scheme {other}"))),
    }
}
