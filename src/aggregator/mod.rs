//! The feed-polling scheduler.
//!
//! One cycle picks the least-recently-fetched feed, stamps it as fetched,
//! downloads and parses it, then stores each item not already known by URL.
//! [`run_polling`] repeats that on a fixed period.
//!
//! # Architecture
//!
//! - [`store`] - the [`FeedStore`] operations a cycle needs, implemented by
//!   [`crate::storage::Database`]
//! - [`ingest`] - per-item dedup and insert
//! - [`scraper`] - one select/mark/fetch/parse/ingest cycle
//! - [`driver`] - the interval loop with cooperative shutdown

mod driver;
mod ingest;
mod scraper;
mod store;

pub use driver::{run_polling, PollStats};
pub use ingest::{ingest_item, IngestOutcome, InsertError, SkipReason};
pub use scraper::{scrape_next, CycleOutcome, CycleReport, ScrapeError};
pub use store::FeedStore;
