//! Feed retrieval and decoding.
//!
//! - [`fetcher`] - HTTP GET with a fixed `User-Agent`, bounded timeout and size cap
//! - [`parser`] - RSS 2.0 channel/item decoding with HTML entity unescaping
//! - [`dates`] - `pubDate` normalization with a zero-time fallback
//!
//! These are the leaves of a polling cycle; the scheduler in
//! [`crate::aggregator`] composes them.

mod dates;
mod fetcher;
mod parser;

pub use dates::{normalize_pub_date, ZERO_TIME};
pub use fetcher::{FeedFetcher, FetchError};
pub use parser::{parse_feed, unescape_html, ParseError, RssFeed, RssItem};
