// Scheduler module - drives the timer-based node stats scrapers
//
// This module implements the periodic half of the exporter using Tokio tasks.
// Pull-on-demand collectors are not scheduled here; they run inside each
// exposition request instead.
//
// # Architecture
// - Each scraper runs in its own async task on a shared interval
// - A pass is awaited inside the loop, so one scraper never overlaps itself
// - Ticks missed while a pass overruns are skipped, not queued
// - Failures only change the scraper's liveness gauge; the loop keeps going

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use crate::node_stats::NodeStatsScraper;

/// Runs every registered scraper at a fixed interval
pub struct ScrapeScheduler {
    scrapers: Vec<Arc<NodeStatsScraper>>,
    period: Duration,
}

impl ScrapeScheduler {
    /// Creates a new ScrapeScheduler
    ///
    /// # Arguments
    /// * `scrapers` - Scrapers to drive; the same instances must be registered for exposition
    /// * `period` - Time between the starts of two passes
    pub fn new(scrapers: Vec<Arc<NodeStatsScraper>>, period: Duration) -> Self {
        ScrapeScheduler { scrapers, period }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Spawns one task per scraper and returns their handles
    pub fn spawn(&self) -> Vec<JoinHandle<()>> {
        self.scrapers
            .iter()
            .map(|scraper| {
                info!(
                    "Scheduling scraper '{}' every {}s",
                    scraper.name(),
                    self.period.as_secs_f64()
                );
                tokio::spawn(Self::run_scraper_task(Arc::clone(scraper), self.period))
            })
            .collect()
    }

    /// Starts every scraper and waits on them (they run until the process exits)
    pub async fn start(self) {
        let handles = self.spawn();
        info!("Started {} scrape task(s)", handles.len());

        for handle in handles {
            if let Err(e) = handle.await {
                error!("Scrape task panicked: {}", e);
            }
        }

        error!("All scrape tasks have stopped");
    }

    /// Core loop of one scraper
    ///
    /// The first tick fires immediately so gauges are populated before the
    /// first exposition request is likely to arrive.
    async fn run_scraper_task(scraper: Arc<NodeStatsScraper>, period: Duration) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            scraper.scrape().await;
        }
    }

    /// Runs a single pass of every scraper, one after another
    ///
    /// # Returns
    /// Number of scrapers whose pass succeeded
    pub async fn collect_once(&self) -> usize {
        let mut succeeded = 0;
        for scraper in &self.scrapers {
            scraper.scrape().await;
            if scraper.is_up() {
                succeeded += 1;
            }
        }

        info!(
            "One-time scrape complete: {}/{} scraper(s) succeeded",
            succeeded,
            self.scrapers.len()
        );
        succeeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{jvm, node};
    use crate::node_stats::NodeLabel;
    use crate::source::fake::{Reply, ScriptedSource};
    use serde_json::json;
    use std::sync::atomic::Ordering;

    fn node_doc() -> serde_json::Value {
        json!({"nodes": {"n1": {"host": "es-1", "jvm": {"mem": {"heap_used_in_bytes": 1}}}}})
    }

    fn scraper(source: Arc<ScriptedSource>) -> Arc<NodeStatsScraper> {
        Arc::new(
            NodeStatsScraper::with_definitions(
                "nodes",
                node::ENDPOINT,
                source,
                node::liveness(),
                vec![jvm::heap_metric("used").unwrap()],
                NodeLabel::Host,
            )
            .unwrap(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_overrunning_pass_never_overlaps() {
        let source = Arc::new(
            ScriptedSource::document(node_doc()).with_delay(Duration::from_secs(3)),
        );
        let scheduler = ScrapeScheduler::new(vec![scraper(Arc::clone(&source))], Duration::from_secs(1));

        let handles = scheduler.spawn();
        tokio::time::sleep(Duration::from_secs(10)).await;
        handles.iter().for_each(JoinHandle::abort);

        assert_eq!(source.max_in_flight.load(Ordering::SeqCst), 1);
        // one pass every ~3s, missed ticks are not replayed
        let fetches = source.fetch_count();
        assert!((3..=5).contains(&fetches), "unexpected fetch count {}", fetches);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_survives_failed_pass() {
        let source = Arc::new(ScriptedSource::new(vec![
            Reply::Status(500),
            Reply::Document(node_doc()),
        ]));
        let scraper = scraper(Arc::clone(&source));
        let scheduler = ScrapeScheduler::new(vec![Arc::clone(&scraper)], Duration::from_secs(5));

        let handles = scheduler.spawn();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!scraper.is_up());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(scraper.is_up());
        assert_eq!(source.fetch_count(), 2);
        handles.iter().for_each(JoinHandle::abort);
    }

    #[tokio::test]
    async fn test_collect_once_counts_successes() {
        let healthy = scraper(Arc::new(ScriptedSource::document(node_doc())));
        let broken = scraper(Arc::new(ScriptedSource::new(vec![Reply::Status(503)])));
        let scheduler = ScrapeScheduler::new(vec![healthy, broken], Duration::from_secs(5));

        assert_eq!(scheduler.collect_once().await, 1);
        assert_eq!(scheduler.period(), Duration::from_secs(5));
    }
}
