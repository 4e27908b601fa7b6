use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds a lock on the database file
    #[error("The database is locked by another gator process. Please stop it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// A uniqueness constraint rejected the write (duplicate user name, feed URL, follow)
    #[error("{0} already exists")]
    Duplicate(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5), SQLITE_LOCKED (6), SQLITE_CANTOPEN (14)
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return DatabaseError::InstanceLocked;
        }

        DatabaseError::Other(err)
    }

    /// Map a UNIQUE constraint violation to [`DatabaseError::Duplicate`].
    pub(crate) fn unique_or_other(err: sqlx::Error, what: impl Into<String>) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return DatabaseError::Duplicate(what.into());
            }
        }
        DatabaseError::Other(err)
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// A registered user. Feeds are owned by users and followed by users.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A registered syndication source.
///
/// `last_fetched_at` is the only field the scheduler mutates. `None` means the
/// feed has never been polled and sorts ahead of every fetched feed.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Feed {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub user_id: Option<i64>,
    /// Unix microseconds
    pub last_fetched_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Feed listing row joined with the owner's name (`gator feeds`).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FeedWithOwner {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub owner_name: Option<String>,
    /// Unix microseconds
    pub last_fetched_at: Option<i64>,
}

/// A user's subscription to a feed, joined with the names for display.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FeedFollow {
    pub id: i64,
    pub user_id: i64,
    pub feed_id: i64,
    pub user_name: String,
    pub feed_name: String,
    pub created_at: i64,
}

/// A stored feed entry. Unique by `url` across all feeds.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Post {
    pub id: i64,
    pub feed_id: i64,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    /// Unix seconds; `0` when the item's date could not be parsed
    pub published_at: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Fields for a post about to be inserted. Identity and creation times are
/// assigned by the store.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub feed_id: i64,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub published_at: i64,
}

/// Post joined with its feed name (`gator browse`).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PostWithFeed {
    pub id: i64,
    pub feed_name: String,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub published_at: i64,
}
