//! SQLite persistence for users, feeds, follows and posts.
//!
//! All operations are inherent methods on [`Database`], split by table into
//! submodules. Timestamps are stored as Unix seconds, except
//! `feeds.last_fetched_at` which is in microseconds.

mod feeds;
mod follows;
mod posts;
mod schema;
mod types;
mod users;

pub use schema::Database;
pub use types::{DatabaseError, Feed, FeedFollow, FeedWithOwner, NewPost, Post, PostWithFeed, User};
