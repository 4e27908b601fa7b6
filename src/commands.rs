//! Subcommand handlers.
//!
//! Each handler takes the shared [`App`] and writes its human-readable
//! output to `out` (stdout in the binary, a buffer in tests). Diagnostics go
//! through `tracing` instead.

use anyhow::{bail, Context, Result};
use chrono::DateTime;
use std::future::Future;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use crate::aggregator::run_polling;
use crate::app::App;
use crate::cli::Command;
use crate::config::Config;
use crate::storage::{DatabaseError, Feed};
use crate::util::validate_url;

/// Dispatch one parsed subcommand. `agg` stops on Ctrl-C.
pub async fn run(app: &mut App, command: Command, out: &mut impl Write) -> Result<()> {
    match command {
        Command::Register { name } => register(app, &name, out).await,
        Command::Login { name } => login(app, &name, out).await,
        Command::Users => users(app, out).await,
        Command::Reset => reset(app, out).await,
        Command::SetDb { path } => set_db(&mut app.config, &app.config_path, &path, out),
        Command::Addfeed { name, url } => add_feed(app, &name, &url, out).await,
        Command::Feeds => feeds(app, out).await,
        Command::Follow { url } => follow(app, &url, out).await,
        Command::Following => following(app, out).await,
        Command::Unfollow { url } => unfollow(app, &url, out).await,
        Command::Browse { limit } => browse(app, limit, out).await,
        Command::Agg { interval } => agg(app, interval, ctrl_c(), out).await,
    }
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        // Without a signal handler the loop could never be stopped cleanly
        tracing::error!(error = %e, "Failed to listen for Ctrl-C, stopping");
    }
}

// ============================================================================
// Users
// ============================================================================

pub async fn register(app: &mut App, name: &str, out: &mut impl Write) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        bail!("User name must not be empty");
    }
    let user = match app.db.create_user(name).await {
        Ok(user) => user,
        Err(DatabaseError::Duplicate(_)) => bail!("User '{}' already exists", name),
        Err(e) => return Err(e).context("Failed to create user"),
    };
    app.set_current_user(&user.name)?;
    tracing::info!(user_id = user.id, name = %user.name, "Registered user");
    writeln!(out, "User '{}' created and logged in", user.name)?;
    Ok(())
}

pub async fn login(app: &mut App, name: &str, out: &mut impl Write) -> Result<()> {
    let user = app
        .db
        .get_user_by_name(name.trim())
        .await
        .context("Failed to look up user")?
        .with_context(|| format!("User '{}' does not exist, register it first", name.trim()))?;
    app.set_current_user(&user.name)?;
    writeln!(out, "Logged in as '{}'", user.name)?;
    Ok(())
}

pub async fn users(app: &App, out: &mut impl Write) -> Result<()> {
    let users = app.db.get_users().await.context("Failed to list users")?;
    if users.is_empty() {
        writeln!(out, "No users registered")?;
        return Ok(());
    }
    let current = app.config.current_user_name.as_deref();
    for user in users {
        if Some(user.name.as_str()) == current {
            writeln!(out, "* {} (current)", user.name)?;
        } else {
            writeln!(out, "* {}", user.name)?;
        }
    }
    Ok(())
}

pub async fn reset(app: &App, out: &mut impl Write) -> Result<()> {
    let removed = app.db.reset().await.context("Failed to reset database")?;
    tracing::info!(users = removed, "Database reset");
    writeln!(out, "Database reset: removed {} users with their feeds and posts", removed)?;
    Ok(())
}

/// Persist a new `db_path`. Takes effect on the next command.
///
/// Relative paths are made absolute against the working directory, since a
/// relative `db_path` in the file would be read relative to the config dir.
/// Needs no database, so `main` runs it before opening one.
pub fn set_db(
    config: &mut Config,
    config_path: &Path,
    path: &Path,
    out: &mut impl Write,
) -> Result<()> {
    if path.as_os_str().is_empty() {
        bail!("Database path must not be empty");
    }
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .context("Failed to resolve relative database path")?
            .join(path)
    };
    config.db_path = Some(path.clone());
    config.save(config_path).with_context(|| {
        format!("Failed to save config to '{}'", config_path.display())
    })?;
    tracing::info!(path = %path.display(), "Database path updated");
    writeln!(out, "Database set to {}", path.display())?;
    Ok(())
}

// ============================================================================
// Feeds and follows
// ============================================================================

pub async fn add_feed(app: &App, name: &str, url: &str, out: &mut impl Write) -> Result<()> {
    let user = app.current_user().await?;
    let name = name.trim();
    if name.is_empty() {
        bail!("Feed name must not be empty");
    }
    let url = validate_url(url, app.config.allow_private_hosts)?;

    let feed = match app.db.create_feed(name, url.as_str(), Some(user.id)).await {
        Ok(feed) => feed,
        Err(DatabaseError::Duplicate(_)) => {
            bail!("A feed with URL {} is already registered, follow it instead", url)
        }
        Err(e) => return Err(e).context("Failed to create feed"),
    };
    app.db
        .create_feed_follow(user.id, feed.id)
        .await
        .context("Feed created but following it failed")?;

    tracing::info!(feed_id = feed.id, url = %feed.url, user = %user.name, "Feed added");
    writeln!(out, "Added feed '{}' ({})", feed.name, feed.url)?;
    writeln!(out, "{} now follows '{}'", user.name, feed.name)?;
    Ok(())
}

pub async fn feeds(app: &App, out: &mut impl Write) -> Result<()> {
    let feeds = app
        .db
        .get_feeds_with_owner()
        .await
        .context("Failed to list feeds")?;
    if feeds.is_empty() {
        writeln!(out, "No feeds registered")?;
        return Ok(());
    }
    for feed in feeds {
        writeln!(out, "* {}", feed.name)?;
        writeln!(out, "  URL:     {}", feed.url)?;
        writeln!(
            out,
            "  Owner:   {}",
            feed.owner_name.as_deref().unwrap_or("(none)")
        )?;
        let fetched = feed
            .last_fetched_at
            .map(|micros| format_timestamp(micros.div_euclid(1_000_000)))
            .unwrap_or_else(|| "never".to_string());
        writeln!(out, "  Fetched: {}", fetched)?;
    }
    Ok(())
}

pub async fn follow(app: &App, url: &str, out: &mut impl Write) -> Result<()> {
    let user = app.current_user().await?;
    let feed = registered_feed(app, url).await?;
    match app.db.create_feed_follow(user.id, feed.id).await {
        Ok(follow) => {
            writeln!(out, "{} now follows '{}'", follow.user_name, follow.feed_name)?;
            Ok(())
        }
        Err(DatabaseError::Duplicate(_)) => {
            bail!("{} already follows '{}'", user.name, feed.name)
        }
        Err(e) => Err(e).context("Failed to follow feed"),
    }
}

pub async fn following(app: &App, out: &mut impl Write) -> Result<()> {
    let user = app.current_user().await?;
    let follows = app
        .db
        .get_feed_follows_for_user(user.id)
        .await
        .context("Failed to list follows")?;
    if follows.is_empty() {
        writeln!(out, "{} doesn't follow any feeds", user.name)?;
        return Ok(());
    }
    for follow in follows {
        writeln!(out, "* {}", follow.feed_name)?;
    }
    Ok(())
}

pub async fn unfollow(app: &App, url: &str, out: &mut impl Write) -> Result<()> {
    let user = app.current_user().await?;
    let feed = registered_feed(app, url).await?;
    let removed = app
        .db
        .delete_feed_follow(user.id, feed.id)
        .await
        .context("Failed to unfollow feed")?;
    if !removed {
        bail!("{} doesn't follow '{}'", user.name, feed.name);
    }
    writeln!(out, "{} unfollowed '{}'", user.name, feed.name)?;
    Ok(())
}

/// Look a feed up by URL, accepting the same spellings `addfeed` normalizes.
async fn registered_feed(app: &App, url: &str) -> Result<Feed> {
    let key = url::Url::parse(url.trim())
        .map(String::from)
        .unwrap_or_else(|_| url.trim().to_string());
    app.db
        .get_feed_by_url(&key)
        .await
        .context("Failed to look up feed")?
        .with_context(|| format!("No feed registered with URL {}, add it with addfeed", key))
}

// ============================================================================
// Posts
// ============================================================================

pub async fn browse(app: &App, limit: i64, out: &mut impl Write) -> Result<()> {
    let user = app.current_user().await?;
    let posts = app
        .db
        .get_posts_for_user(user.id, limit)
        .await
        .context("Failed to load posts")?;
    if posts.is_empty() {
        writeln!(out, "No posts yet: follow some feeds and run `gator agg`")?;
        return Ok(());
    }
    for post in posts {
        let date = if post.published_at == 0 {
            "unknown date".to_string()
        } else {
            format_timestamp(post.published_at)
        };
        writeln!(out, "{} | {}", date, post.feed_name)?;
        writeln!(out, "--- {} ---", post.title)?;
        if let Some(description) = &post.description {
            writeln!(out, "    {}", description)?;
        }
        writeln!(out, "Link: {}", post.url)?;
        writeln!(out, "=====================================")?;
    }
    Ok(())
}

/// Poll feeds every `interval` until `shutdown` resolves.
pub async fn agg<F>(app: &App, interval: Duration, shutdown: F, out: &mut impl Write) -> Result<()>
where
    F: Future<Output = ()>,
{
    writeln!(out, "Collecting feeds every {:?} (Ctrl-C to stop)", interval)?;
    out.flush()?;
    let stats = run_polling(&app.db, &app.fetcher, interval, shutdown).await;
    writeln!(
        out,
        "Stopped after {} cycles: {} new posts, {} failed cycles",
        stats.cycles, stats.posts_inserted, stats.failed
    )?;
    Ok(())
}

fn format_timestamp(secs: i64) -> String {
    DateTime::from_timestamp(secs, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| secs.to_string())
}
