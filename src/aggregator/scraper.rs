use chrono::Utc;
use thiserror::Error;

use super::ingest::{ingest_item, IngestOutcome, InsertError};
use super::store::FeedStore;
use crate::feed::{normalize_pub_date, parse_feed, FeedFetcher, FetchError, ParseError};
use crate::storage::DatabaseError;

/// Why a cycle stopped early. None of these stop the poller.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("Failed to select next feed: {0}")]
    Select(#[source] DatabaseError),
    #[error("Failed to mark feed {feed_id} as fetched: {source}")]
    Mark { feed_id: i64, source: DatabaseError },
    #[error("Failed to fetch feed {url}: {source}")]
    Fetch { url: String, source: FetchError },
    #[error("Failed to parse feed {url}: {source}")]
    Parse { url: String, source: ParseError },
    /// Remaining items of the batch were not attempted
    #[error("Aborted feed {feed_id} after {inserted} new posts: {source}")]
    Insert {
        feed_id: i64,
        inserted: usize,
        source: InsertError,
    },
}

/// Counts for one feed's batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub feed_id: i64,
    pub feed_name: String,
    pub items: usize,
    pub inserted: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No feeds are registered
    Idle,
    Scraped(CycleReport),
}

/// Runs one polling cycle: select, mark, fetch, parse, ingest.
///
/// The selected feed is stamped as fetched *before* the request goes out, in
/// its own statement. A fetch that hangs or fails therefore still moves the
/// feed to the back of the rotation, and the next cycle picks a different
/// feed.
///
/// Items are ingested in document order. The first store failure aborts the
/// rest of the batch; posts inserted before it stay.
///
/// # Errors
///
/// See [`ScrapeError`]. An empty store is not an error but
/// [`CycleOutcome::Idle`].
pub async fn scrape_next<S: FeedStore>(
    store: &S,
    fetcher: &FeedFetcher,
) -> Result<CycleOutcome, ScrapeError> {
    let Some(feed) = store
        .select_next_feed()
        .await
        .map_err(ScrapeError::Select)?
    else {
        return Ok(CycleOutcome::Idle);
    };

    store
        .mark_fetched(feed.id, Utc::now())
        .await
        .map_err(|source| ScrapeError::Mark {
            feed_id: feed.id,
            source,
        })?;

    tracing::info!(feed_id = feed.id, name = %feed.name, url = %feed.url, "Fetching feed");

    let bytes = fetcher
        .fetch(&feed.url)
        .await
        .map_err(|source| ScrapeError::Fetch {
            url: feed.url.clone(),
            source,
        })?;

    let document = parse_feed(&bytes).map_err(|source| ScrapeError::Parse {
        url: feed.url.clone(),
        source,
    })?;

    let mut report = CycleReport {
        feed_id: feed.id,
        feed_name: feed.name.clone(),
        items: document.items.len(),
        inserted: 0,
        skipped: 0,
    };

    for item in &document.items {
        let published_at = normalize_pub_date(&item.pub_date);
        match ingest_item(store, feed.id, item, published_at).await {
            Ok(IngestOutcome::Inserted(_)) => report.inserted += 1,
            Ok(IngestOutcome::Skipped(_)) => report.skipped += 1,
            Err(source) => {
                return Err(ScrapeError::Insert {
                    feed_id: feed.id,
                    inserted: report.inserted,
                    source,
                })
            }
        }
    }

    Ok(CycleOutcome::Scraped(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Database, Feed, NewPost, Post};
    use chrono::DateTime;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> FeedFetcher {
        FeedFetcher::new("gator-test", Duration::from_secs(5)).unwrap()
    }

    fn rss(items: &[(&str, &str)]) -> String {
        let body: String = items
            .iter()
            .map(|(title, link)| {
                format!(
                    "<item><title>{title}</title><link>{link}</link>\
                     <pubDate>Mon, 02 Jan 2006 15:04:05 +0000</pubDate></item>"
                )
            })
            .collect();
        format!("<rss version=\"2.0\"><channel><title>T</title>{body}</channel></rss>")
    }

    async fn serve(server: &MockServer, route: &str, status: u16, body: String) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(server)
            .await;
    }

    /// Delegates to a real database but fails the insert of one URL, and
    /// records every URL it was asked to insert.
    struct FailingInsertStore {
        db: Database,
        fail_url: String,
        attempted: RefCell<Vec<String>>,
    }

    impl FeedStore for FailingInsertStore {
        async fn select_next_feed(&self) -> Result<Option<Feed>, DatabaseError> {
            self.db.select_next_feed().await
        }

        async fn mark_fetched(
            &self,
            feed_id: i64,
            at: DateTime<Utc>,
        ) -> Result<(), DatabaseError> {
            self.db.mark_fetched(feed_id, at).await
        }

        async fn find_post_by_url(&self, url: &str) -> Result<Option<Post>, DatabaseError> {
            self.db.find_post_by_url(url).await
        }

        async fn insert_post(&self, post: &NewPost) -> Result<Post, DatabaseError> {
            self.attempted.borrow_mut().push(post.url.clone());
            if post.url == self.fail_url {
                return Err(DatabaseError::Other(sqlx::Error::Protocol(
                    "injected insert failure".into(),
                )));
            }
            self.db.insert_post(post).await
        }
    }

    #[tokio::test]
    async fn test_empty_store_is_idle() {
        let db = Database::open(":memory:").await.unwrap();
        let outcome = scrape_next(&db, &fetcher()).await.unwrap();
        assert_eq!(outcome, CycleOutcome::Idle);
    }

    #[tokio::test]
    async fn test_cycle_inserts_posts_and_marks_feed() {
        let server = MockServer::start().await;
        serve(
            &server,
            "/feed",
            200,
            rss(&[("One", "https://x.example/1"), ("Two", "https://x.example/2")]),
        )
        .await;

        let db = Database::open(":memory:").await.unwrap();
        let feed = db
            .create_feed("X", &format!("{}/feed", server.uri()), None)
            .await
            .unwrap();

        let before = Utc::now().timestamp_micros();
        let outcome = scrape_next(&db, &fetcher()).await.unwrap();
        let CycleOutcome::Scraped(report) = outcome else {
            panic!("expected a scraped cycle");
        };
        assert_eq!(report.feed_id, feed.id);
        assert_eq!(report.items, 2);
        assert_eq!(report.inserted, 2);
        assert_eq!(report.skipped, 0);

        let stored = db.get_feed(feed.id).await.unwrap().unwrap();
        assert!(stored.last_fetched_at.unwrap() >= before);

        let posts = db.get_posts_for_feed(feed.id).await.unwrap();
        assert_eq!(posts.len(), 2);
        assert!(posts.iter().all(|p| p.published_at == 1136214245));
    }

    #[tokio::test]
    async fn test_second_cycle_skips_existing_posts() {
        let server = MockServer::start().await;
        serve(
            &server,
            "/feed",
            200,
            rss(&[("One", "https://x.example/1"), ("Two", "https://x.example/2")]),
        )
        .await;

        let db = Database::open(":memory:").await.unwrap();
        let feed = db
            .create_feed("X", &format!("{}/feed", server.uri()), None)
            .await
            .unwrap();

        scrape_next(&db, &fetcher()).await.unwrap();
        let outcome = scrape_next(&db, &fetcher()).await.unwrap();
        let CycleOutcome::Scraped(report) = outcome else {
            panic!("expected a scraped cycle");
        };
        assert_eq!(report.inserted, 0);
        assert_eq!(report.skipped, 2);
        assert_eq!(db.get_posts_for_feed(feed.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_insert_failure_aborts_remaining_items() {
        let server = MockServer::start().await;
        serve(
            &server,
            "/feed",
            200,
            rss(&[
                ("One", "https://x.example/1"),
                ("Two", "https://x.example/2"),
                ("Three", "https://x.example/3"),
            ]),
        )
        .await;

        let db = Database::open(":memory:").await.unwrap();
        let feed = db
            .create_feed("X", &format!("{}/feed", server.uri()), None)
            .await
            .unwrap();
        let store = FailingInsertStore {
            db: db.clone(),
            fail_url: "https://x.example/2".to_string(),
            attempted: RefCell::new(Vec::new()),
        };

        let err = scrape_next(&store, &fetcher()).await.unwrap_err();
        match err {
            ScrapeError::Insert {
                feed_id, inserted, ..
            } => {
                assert_eq!(feed_id, feed.id);
                assert_eq!(inserted, 1);
            }
            e => panic!("expected Insert error, got {:?}", e),
        }

        let posts = db.get_posts_for_feed(feed.id).await.unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].url, "https://x.example/1");
        assert_eq!(
            *store.attempted.borrow(),
            vec!["https://x.example/1".to_string(), "https://x.example/2".to_string()]
        );
    }

    #[tokio::test]
    async fn test_fetch_failure_still_marks_feed() {
        let db = Database::open(":memory:").await.unwrap();
        // Nothing listens on this port
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let dead = format!("http://{}/feed", listener.local_addr().unwrap());
        drop(listener);
        let broken = db.create_feed("Broken", &dead, None).await.unwrap();

        let server = MockServer::start().await;
        serve(&server, "/ok", 200, rss(&[("One", "https://ok.example/1")])).await;
        let healthy = db
            .create_feed("Healthy", &format!("{}/ok", server.uri()), None)
            .await
            .unwrap();

        let err = scrape_next(&db, &fetcher()).await.unwrap_err();
        assert!(matches!(err, ScrapeError::Fetch { .. }), "got {:?}", err);
        let stored = db.get_feed(broken.id).await.unwrap().unwrap();
        assert!(stored.last_fetched_at.is_some());

        // The failed feed is not picked again right away
        let outcome = scrape_next(&db, &fetcher()).await.unwrap();
        let CycleOutcome::Scraped(report) = outcome else {
            panic!("expected a scraped cycle");
        };
        assert_eq!(report.feed_id, healthy.id);
    }

    #[tokio::test]
    async fn test_parse_failure_reported() {
        let server = MockServer::start().await;
        serve(&server, "/feed", 200, "<html><body>oops".to_string()).await;

        let db = Database::open(":memory:").await.unwrap();
        let feed = db
            .create_feed("X", &format!("{}/feed", server.uri()), None)
            .await
            .unwrap();

        let err = scrape_next(&db, &fetcher()).await.unwrap_err();
        assert!(matches!(err, ScrapeError::Parse { .. }), "got {:?}", err);
        assert!(db.get_feed(feed.id).await.unwrap().unwrap().last_fetched_at.is_some());
        assert!(db.get_posts_for_feed(feed.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_non_success_status_with_feed_body_is_ingested() {
        let server = MockServer::start().await;
        serve(&server, "/feed", 404, rss(&[("One", "https://x.example/1")])).await;

        let db = Database::open(":memory:").await.unwrap();
        let feed = db
            .create_feed("X", &format!("{}/feed", server.uri()), None)
            .await
            .unwrap();

        scrape_next(&db, &fetcher()).await.unwrap();
        assert_eq!(db.get_posts_for_feed(feed.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unparseable_date_stored_as_zero() {
        let server = MockServer::start().await;
        let body = "<rss><channel><item><title>A</title><link>https://x.example/a</link>\
                    <pubDate>sometime last week</pubDate></item></channel></rss>"
            .to_string();
        serve(&server, "/feed", 200, body).await;

        let db = Database::open(":memory:").await.unwrap();
        db.create_feed("X", &format!("{}/feed", server.uri()), None)
            .await
            .unwrap();

        scrape_next(&db, &fetcher()).await.unwrap();
        let post = db.get_post_by_url("https://x.example/a").await.unwrap().unwrap();
        assert_eq!(post.published_at, 0);
    }
}
