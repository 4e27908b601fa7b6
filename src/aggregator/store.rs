use chrono::{DateTime, Utc};

use crate::storage::{Database, DatabaseError, Feed, NewPost, Post};

/// The store operations one polling cycle depends on.
///
/// [`Database`] is the production implementation. Each call is its own
/// committed statement; the cycle never holds a transaction across the
/// network fetch.
#[allow(async_fn_in_trait)]
pub trait FeedStore {
    /// The least-recently-fetched feed, never-fetched feeds first.
    async fn select_next_feed(&self) -> Result<Option<Feed>, DatabaseError>;

    /// Set the feed's `last_fetched_at`.
    async fn mark_fetched(&self, feed_id: i64, at: DateTime<Utc>) -> Result<(), DatabaseError>;

    /// Exact-URL post lookup.
    async fn find_post_by_url(&self, url: &str) -> Result<Option<Post>, DatabaseError>;

    async fn insert_post(&self, post: &NewPost) -> Result<Post, DatabaseError>;
}

impl FeedStore for Database {
    async fn select_next_feed(&self) -> Result<Option<Feed>, DatabaseError> {
        self.get_next_feed_to_fetch().await
    }

    async fn mark_fetched(&self, feed_id: i64, at: DateTime<Utc>) -> Result<(), DatabaseError> {
        self.mark_feed_fetched(feed_id, at).await
    }

    async fn find_post_by_url(&self, url: &str) -> Result<Option<Post>, DatabaseError> {
        self.get_post_by_url(url).await
    }

    async fn insert_post(&self, post: &NewPost) -> Result<Post, DatabaseError> {
        self.create_post(post).await
    }
}
