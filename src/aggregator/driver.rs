use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

use super::scraper::{scrape_next, CycleOutcome, ScrapeError};
use super::store::FeedStore;
use crate::feed::FeedFetcher;

/// Tallies of a polling run, returned when it stops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollStats {
    pub cycles: u64,
    pub idle: u64,
    pub failed: u64,
    pub posts_inserted: u64,
}

/// Runs one scrape cycle every `period` until `shutdown` resolves.
///
/// The first cycle starts immediately. Ticks missed while a slow cycle runs
/// are dropped rather than bunched up. Shutdown is only checked between
/// cycles: a cycle already in progress finishes (or fails) on its own.
///
/// Cycle errors are logged and counted; they never end the loop.
///
/// # Panics
///
/// If `period` is zero (rejected earlier by [`crate::util::parse_interval`]).
pub async fn run_polling<S, F>(
    store: &S,
    fetcher: &FeedFetcher,
    period: Duration,
    shutdown: F,
) -> PollStats
where
    S: FeedStore,
    F: Future<Output = ()>,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    let mut stats = PollStats::default();
    tracing::info!(period = ?period, "Collecting feeds");

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                tracing::info!(cycles = stats.cycles, "Shutdown requested, stopping");
                break;
            }
            _ = ticker.tick() => {}
        }

        stats.cycles += 1;
        match scrape_next(store, fetcher).await {
            Ok(CycleOutcome::Idle) => {
                stats.idle += 1;
                tracing::info!("No feeds registered, nothing to fetch");
            }
            Ok(CycleOutcome::Scraped(report)) => {
                stats.posts_inserted += report.inserted as u64;
                tracing::info!(
                    feed_id = report.feed_id,
                    name = %report.feed_name,
                    items = report.items,
                    inserted = report.inserted,
                    skipped = report.skipped,
                    "Feed collected"
                );
            }
            Err(e) => {
                stats.failed += 1;
                log_cycle_error(&e);
            }
        }
    }

    stats
}

fn log_cycle_error(err: &ScrapeError) {
    match err {
        ScrapeError::Fetch { .. } | ScrapeError::Parse { .. } => {
            tracing::warn!(error = %err, "Cycle failed, feed will be retried on its next turn");
        }
        ScrapeError::Insert { .. } | ScrapeError::Select(_) | ScrapeError::Mark { .. } => {
            tracing::error!(error = %err, "Cycle aborted by store failure");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> FeedFetcher {
        FeedFetcher::new("gator-test", Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_stops_immediately_when_already_shut_down() {
        let db = Database::open(":memory:").await.unwrap();
        let stats = run_polling(&db, &fetcher(), Duration::from_millis(10), async {}).await;
        assert_eq!(stats.cycles, 0);
    }

    #[tokio::test]
    async fn test_idle_cycles_until_shutdown() {
        let db = Database::open(":memory:").await.unwrap();
        let shutdown = tokio::time::sleep(Duration::from_millis(80));
        let stats = run_polling(&db, &fetcher(), Duration::from_millis(10), shutdown).await;
        assert!(stats.cycles >= 1, "{:?}", stats);
        assert_eq!(stats.idle, stats.cycles);
        assert_eq!(stats.failed, 0);
    }

    #[tokio::test]
    async fn test_in_flight_cycle_completes_before_shutdown() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(
                        "<rss><channel><item><title>A</title>\
                         <link>https://slow.example/a</link></item></channel></rss>",
                    )
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&server)
            .await;

        let db = Database::open(":memory:").await.unwrap();
        db.create_feed("Slow", &server.uri(), None).await.unwrap();

        // Shutdown fires while the first fetch is still waiting on the server
        let shutdown = tokio::time::sleep(Duration::from_millis(50));
        let stats = run_polling(&db, &fetcher(), Duration::from_secs(60), shutdown).await;

        assert_eq!(stats.cycles, 1);
        assert_eq!(stats.posts_inserted, 1);
        assert!(db.get_post_by_url("https://slow.example/a").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_failed_cycles_do_not_stop_polling() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not a feed"))
            .mount(&server)
            .await;

        let db = Database::open(":memory:").await.unwrap();
        db.create_feed("Bad", &server.uri(), None).await.unwrap();

        let shutdown = tokio::time::sleep(Duration::from_millis(100));
        let stats = run_polling(&db, &fetcher(), Duration::from_millis(10), shutdown).await;
        assert!(stats.cycles >= 2, "{:?}", stats);
        assert_eq!(stats.failed, stats.cycles);
    }
}
