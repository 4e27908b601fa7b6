use chrono::{DateTime, Utc};

use super::schema::Database;
use super::types::{DatabaseError, Feed, FeedWithOwner};

const FEED_COLUMNS: &str = "id, name, url, user_id, last_fetched_at, created_at, updated_at";

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Register a feed. URLs are globally unique.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Duplicate`] if a feed with this URL already exists.
    pub async fn create_feed(
        &self,
        name: &str,
        url: &str,
        user_id: Option<i64>,
    ) -> Result<Feed, DatabaseError> {
        let now = Utc::now().timestamp();
        sqlx::query_as::<_, Feed>(&format!(
            r#"
            INSERT INTO feeds (name, url, user_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING {FEED_COLUMNS}
        "#
        ))
        .bind(name)
        .bind(url)
        .bind(user_id)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DatabaseError::unique_or_other(e, format!("Feed '{}'", url)))
    }

    pub async fn get_feed_by_url(&self, url: &str) -> Result<Option<Feed>, DatabaseError> {
        let feed = sqlx::query_as::<_, Feed>(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds WHERE url = ?"
        ))
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;
        Ok(feed)
    }

    pub async fn get_feed(&self, feed_id: i64) -> Result<Option<Feed>, DatabaseError> {
        let feed = sqlx::query_as::<_, Feed>(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds WHERE id = ?"
        ))
        .bind(feed_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(feed)
    }

    /// All feeds in registration order
    pub async fn get_feeds(&self) -> Result<Vec<Feed>, DatabaseError> {
        let feeds = sqlx::query_as::<_, Feed>(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(feeds)
    }

    /// All feeds with the owning user's name, for listing
    pub async fn get_feeds_with_owner(&self) -> Result<Vec<FeedWithOwner>, DatabaseError> {
        let feeds = sqlx::query_as::<_, FeedWithOwner>(
            r#"
            SELECT f.id, f.name, f.url, u.name AS owner_name, f.last_fetched_at
            FROM feeds f
            LEFT JOIN users u ON u.id = f.user_id
            ORDER BY f.id
        "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(feeds)
    }

    // ========================================================================
    // Scheduling
    // ========================================================================

    /// The feed that has waited longest since its last fetch.
    ///
    /// Never-fetched feeds (`last_fetched_at IS NULL`) come first; ties go to
    /// the feed registered earliest.
    pub async fn get_next_feed_to_fetch(&self) -> Result<Option<Feed>, DatabaseError> {
        let feed = sqlx::query_as::<_, Feed>(&format!(
            r#"
            SELECT {FEED_COLUMNS}
            FROM feeds
            ORDER BY last_fetched_at ASC NULLS FIRST, id ASC
            LIMIT 1
        "#
        ))
        .fetch_optional(&self.pool)
        .await?;
        Ok(feed)
    }

    /// Stamp a feed as fetched at `fetched_at`.
    ///
    /// `last_fetched_at` keeps microseconds so that cycles run a few
    /// milliseconds apart still order strictly; `updated_at` stays in
    /// seconds like every other row timestamp.
    ///
    /// A single-row UPDATE committed on its own, independent of whatever the
    /// caller does next.
    pub async fn mark_feed_fetched(
        &self,
        feed_id: i64,
        fetched_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE feeds SET last_fetched_at = ?, updated_at = ? WHERE id = ?")
            .bind(fetched_at.timestamp_micros())
            .bind(fetched_at.timestamp())
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_create_feed_roundtrips() {
        let db = test_db().await;
        let feed = db
            .create_feed("Lane's Blog", "https://www.wagslane.dev/index.xml", None)
            .await
            .unwrap();
        assert!(feed.last_fetched_at.is_none());
        assert_eq!(feed.user_id, None);

        let by_url = db
            .get_feed_by_url("https://www.wagslane.dev/index.xml")
            .await
            .unwrap();
        assert_eq!(by_url.as_ref(), Some(&feed));
        assert_eq!(db.get_feed(feed.id).await.unwrap(), Some(feed));
    }

    #[tokio::test]
    async fn test_duplicate_feed_url_rejected() {
        let db = test_db().await;
        db.create_feed("A", "https://example.com/rss", None)
            .await
            .unwrap();
        let err = db
            .create_feed("B", "https://example.com/rss", None)
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::Duplicate(_)));
    }

    #[tokio::test]
    async fn test_next_feed_empty_store() {
        let db = test_db().await;
        assert!(db.get_next_feed_to_fetch().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_never_fetched_feed_selected_first() {
        let db = test_db().await;
        let fetched = db
            .create_feed("Old", "https://example.com/old", None)
            .await
            .unwrap();
        let hour_ago = Utc::now() - Duration::hours(1);
        db.mark_feed_fetched(fetched.id, hour_ago).await.unwrap();
        let fresh = db
            .create_feed("New", "https://example.com/new", None)
            .await
            .unwrap();

        let next = db.get_next_feed_to_fetch().await.unwrap().unwrap();
        assert_eq!(next.id, fresh.id);
    }

    #[tokio::test]
    async fn test_oldest_fetch_selected() {
        let db = test_db().await;
        let a = db.create_feed("A", "https://a.example/rss", None).await.unwrap();
        let b = db.create_feed("B", "https://b.example/rss", None).await.unwrap();
        let t = Utc::now();
        db.mark_feed_fetched(a.id, t).await.unwrap();
        db.mark_feed_fetched(b.id, t - Duration::seconds(1)).await.unwrap();

        let next = db.get_next_feed_to_fetch().await.unwrap().unwrap();
        assert_eq!(next.id, b.id);
    }

    #[tokio::test]
    async fn test_fetches_within_one_second_keep_their_order() {
        let db = test_db().await;
        let a = db.create_feed("A", "https://a.example/rss", None).await.unwrap();
        let b = db.create_feed("B", "https://b.example/rss", None).await.unwrap();
        let t = DateTime::from_timestamp(1_700_000_000, 0).unwrap();

        // The lower id was fetched 5ms later, so it must wait its turn
        db.mark_feed_fetched(b.id, t).await.unwrap();
        db.mark_feed_fetched(a.id, t + Duration::milliseconds(5)).await.unwrap();

        let next = db.get_next_feed_to_fetch().await.unwrap().unwrap();
        assert_eq!(next.id, b.id);
    }

    #[tokio::test]
    async fn test_mark_feed_fetched_updates_timestamp() {
        let db = test_db().await;
        let feed = db.create_feed("A", "https://a.example/rss", None).await.unwrap();
        let t = DateTime::from_timestamp(1_700_000_000, 250_000_000).unwrap();
        db.mark_feed_fetched(feed.id, t).await.unwrap();

        let stored = db.get_feed(feed.id).await.unwrap().unwrap();
        assert_eq!(stored.last_fetched_at, Some(1_700_000_000_250_000));
        assert_eq!(stored.updated_at, 1_700_000_000);
    }

    #[tokio::test]
    async fn test_feed_survives_owner_deletion() {
        let db = test_db().await;
        let user = db.create_user("owner").await.unwrap();
        let feed = db
            .create_feed("A", "https://a.example/rss", Some(user.id))
            .await
            .unwrap();

        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(user.id)
            .execute(&db.pool)
            .await
            .unwrap();

        let stored = db.get_feed(feed.id).await.unwrap().unwrap();
        assert_eq!(stored.user_id, None);
        let listed = db.get_feeds_with_owner().await.unwrap();
        assert_eq!(listed[0].owner_name, None);
    }
}
