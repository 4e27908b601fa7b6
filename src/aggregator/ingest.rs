use chrono::{DateTime, Utc};
use thiserror::Error;

use super::store::FeedStore;
use crate::feed::RssItem;
use crate::storage::{DatabaseError, NewPost, Post};

/// A store failure while deduplicating or inserting one item.
#[derive(Debug, Error)]
#[error("Failed to store post {url}: {source}")]
pub struct InsertError {
    pub url: String,
    #[source]
    pub source: DatabaseError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// A post with this URL already exists (from any feed)
    Duplicate,
    /// The item has no link, so there is nothing to deduplicate on
    MissingLink,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Inserted(Post),
    Skipped(SkipReason),
}

/// Stores one parsed item as a post of `feed_id`, unless its URL is taken.
///
/// Existing posts are left as they are, even if the upstream title or
/// description changed since. The item's text fields are expected to be
/// entity-decoded already (see [`crate::feed::parse_feed`]); an empty
/// description is stored as NULL.
///
/// # Errors
///
/// [`InsertError`] if either the lookup or the insert fails. A concurrent
/// insert of the same URL lands here as a duplicate-key error.
pub async fn ingest_item<S: FeedStore>(
    store: &S,
    feed_id: i64,
    item: &RssItem,
    published_at: DateTime<Utc>,
) -> Result<IngestOutcome, InsertError> {
    if item.link.is_empty() {
        tracing::warn!(feed_id = feed_id, title = %item.title, "Item has no link, skipping");
        return Ok(IngestOutcome::Skipped(SkipReason::MissingLink));
    }

    let existing = store
        .find_post_by_url(&item.link)
        .await
        .map_err(|source| InsertError {
            url: item.link.clone(),
            source,
        })?;
    if existing.is_some() {
        return Ok(IngestOutcome::Skipped(SkipReason::Duplicate));
    }

    let new_post = NewPost {
        feed_id,
        title: item.title.clone(),
        url: item.link.clone(),
        description: Some(item.description.clone()).filter(|d| !d.is_empty()),
        published_at: published_at.timestamp(),
    };
    let post = store
        .insert_post(&new_post)
        .await
        .map_err(|source| InsertError {
            url: item.link.clone(),
            source,
        })?;

    tracing::debug!(feed_id = feed_id, post_id = post.id, url = %post.url, "Stored new post");
    Ok(IngestOutcome::Inserted(post))
}
