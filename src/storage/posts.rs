use super::schema::Database;
use super::types::{DatabaseError, NewPost, Post, PostWithFeed};

const POST_COLUMNS: &str =
    "id, feed_id, title, url, description, published_at, created_at, updated_at";

impl Database {
    // ========================================================================
    // Post Operations
    // ========================================================================

    /// Exact-match lookup on the post URL (the dedup key)
    pub async fn get_post_by_url(&self, url: &str) -> Result<Option<Post>, DatabaseError> {
        let post = sqlx::query_as::<_, Post>(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE url = ?"
        ))
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;
        Ok(post)
    }

    /// Insert a new post.
    ///
    /// Does not check for an existing URL; a concurrent insert of the same URL
    /// surfaces as [`DatabaseError::Duplicate`].
    pub async fn create_post(&self, post: &NewPost) -> Result<Post, DatabaseError> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query_as::<_, Post>(&format!(
            r#"
            INSERT INTO posts (feed_id, title, url, description, published_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING {POST_COLUMNS}
        "#
        ))
        .bind(post.feed_id)
        .bind(&post.title)
        .bind(&post.url)
        .bind(&post.description)
        .bind(post.published_at)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DatabaseError::unique_or_other(e, format!("Post '{}'", post.url)))
    }

    /// All posts of one feed, newest publication first
    pub async fn get_posts_for_feed(&self, feed_id: i64) -> Result<Vec<Post>, DatabaseError> {
        let posts = sqlx::query_as::<_, Post>(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE feed_id = ? ORDER BY published_at DESC, id DESC"
        ))
        .bind(feed_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(posts)
    }

    /// Newest posts across the feeds a user follows
    pub async fn get_posts_for_user(
        &self,
        user_id: i64,
        limit: i64,
    ) -> Result<Vec<PostWithFeed>, DatabaseError> {
        let posts = sqlx::query_as::<_, PostWithFeed>(
            r#"
            SELECT p.id, f.name AS feed_name, p.title, p.url, p.description, p.published_at
            FROM posts p
            JOIN feed_follows ff ON ff.feed_id = p.feed_id
            JOIN feeds f ON f.id = p.feed_id
            WHERE ff.user_id = ?
            ORDER BY p.published_at DESC, p.id DESC
            LIMIT ?
        "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(posts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn new_post(feed_id: i64, url: &str, published_at: i64) -> NewPost {
        NewPost {
            feed_id,
            title: format!("Title of {}", url),
            url: url.to_string(),
            description: Some("body".to_string()),
            published_at,
        }
    }

    #[tokio::test]
    async fn test_create_and_find_post() {
        let db = Database::open(":memory:").await.unwrap();
        let feed = db.create_feed("A", "https://a.example/rss", None).await.unwrap();

        let post = db
            .create_post(&new_post(feed.id, "https://a.example/1", 1_700_000_000))
            .await
            .unwrap();
        assert_eq!(post.feed_id, feed.id);
        assert_eq!(post.published_at, 1_700_000_000);

        let found = db.get_post_by_url("https://a.example/1").await.unwrap();
        assert_eq!(found, Some(post));
        assert!(db.get_post_by_url("https://a.example/2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_post_url_rejected_by_store() {
        let db = Database::open(":memory:").await.unwrap();
        let a = db.create_feed("A", "https://a.example/rss", None).await.unwrap();
        let b = db.create_feed("B", "https://b.example/rss", None).await.unwrap();
        db.create_post(&new_post(a.id, "https://shared.example/x", 0))
            .await
            .unwrap();

        // Uniqueness is system-wide, not per feed
        let err = db
            .create_post(&new_post(b.id, "https://shared.example/x", 0))
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::Duplicate(_)));
    }

    #[tokio::test]
    async fn test_posts_for_user_only_followed_feeds_newest_first() {
        let db = Database::open(":memory:").await.unwrap();
        let user = db.create_user("kahya").await.unwrap();
        let followed = db.create_feed("A", "https://a.example/rss", None).await.unwrap();
        let other = db.create_feed("B", "https://b.example/rss", None).await.unwrap();
        db.create_feed_follow(user.id, followed.id).await.unwrap();

        db.create_post(&new_post(followed.id, "https://a.example/old", 100))
            .await
            .unwrap();
        db.create_post(&new_post(followed.id, "https://a.example/new", 200))
            .await
            .unwrap();
        db.create_post(&new_post(other.id, "https://b.example/x", 300))
            .await
            .unwrap();

        let posts = db.get_posts_for_user(user.id, 10).await.unwrap();
        let urls: Vec<&str> = posts.iter().map(|p| p.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a.example/new", "https://a.example/old"]);
        assert_eq!(posts[0].feed_name, "A");

        let limited = db.get_posts_for_user(user.id, 1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }
}
