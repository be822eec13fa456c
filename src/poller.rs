//! The poll loop: fetch, extract, diff, deliver, sleep.
//!
//! ```text
//! Idle -> Fetching -> Diffing -> Delivering -> Sleeping -> (next cycle)
//!    \________\__________\___________\____________\---> Cancelled
//! ```
//!
//! One cycle runs to completion before the next starts and deliveries are
//! strictly sequential, so the destination sees items oldest first.
//!
//! # Cycle
//!
//! 1. Fetch the listing page. A failure ends the cycle with no side effects.
//! 2. Extract items in document order (newest first on the source site).
//! 3. Keep only URLs the [`StateStore`] has not seen.
//! 4. On the first productive cycle of the process, keep only the first
//!    `first_run_cap` items so a cold start does not replay the backlog.
//! 5. Reverse, so the oldest of the batch goes out first.
//! 6. Deliver one by one. A success is recorded in the store; a failure is
//!    logged and the item stays "new" for the next cycle.
//!
//! # Cancellation
//!
//! The shared [`CancellationToken`] is checked before each fetch and before
//! each send, and interrupts every wait. A send that has already started is
//! allowed to finish (including its rate-limit retry).

use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::config::Config;
use crate::fetch::{FetchError, PageSource};
use crate::models::Item;
use crate::notify::Notify;
use crate::scrapers::ListingExtractor;
use crate::store::{StateStore, StoreError};
use crate::utils::decode_title;

/// Pause between successful deliveries to stay under the webhook's burst limit.
pub const PACING_DELAY: Duration = Duration::from_millis(1200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Fetching,
    Diffing,
    Delivering,
    Sleeping,
    Cancelled,
}

/// Reasons a cycle ended early. None of them stop the loop.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("state lookup failed: {0}")]
    Store(#[from] StoreError),
}

/// What one cycle did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub extracted: usize,
    pub fresh: usize,
    pub delivered: usize,
    pub failed: usize,
    /// Set when the first-run cap was consumed by this cycle.
    pub cap_applied: bool,
}

#[derive(Debug, Clone)]
pub struct PollSettings {
    pub source_url: Url,
    pub display_name: String,
    pub interval: Duration,
    /// 0 disables the first-run cap.
    pub first_run_cap: usize,
    pub pacing: Duration,
}

impl PollSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            source_url: config.news_url.clone(),
            display_name: config.bot_name.clone(),
            interval: config.check_interval,
            first_run_cap: config.first_run_cap,
            pacing: PACING_DELAY,
        }
    }
}

/// Truncate to `cap` (document order) and flip to delivery order.
pub fn plan_delivery(mut fresh: Vec<Item>, cap: Option<usize>) -> Vec<Item> {
    if let Some(cap) = cap {
        fresh.truncate(cap);
    }
    fresh.reverse();
    fresh
}

pub struct PollLoop<S, N> {
    settings: PollSettings,
    extractor: ListingExtractor,
    source: S,
    notifier: N,
    store: StateStore,
    cancel: CancellationToken,
    /// Armed at startup, consumed by the first cycle that extracts anything.
    first_run_pending: bool,
    phase: Phase,
}

impl<S, N> PollLoop<S, N>
where
    S: PageSource,
    N: Notify,
{
    pub fn new(
        settings: PollSettings,
        extractor: ListingExtractor,
        source: S,
        notifier: N,
        store: StateStore,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            settings,
            extractor,
            source,
            notifier,
            store,
            cancel,
            first_run_pending: true,
            phase: Phase::Idle,
        }
    }

    #[cfg(test)]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn enter(&mut self, phase: Phase) {
        debug!(from = ?self.phase, to = ?phase, "Phase change");
        self.phase = phase;
    }

    /// Poll until cancelled. Cycle errors are logged, never returned.
    pub async fn run(&mut self) {
        while !self.cancel.is_cancelled() {
            self.run_logged().await;

            if self.cancel.is_cancelled() {
                break;
            }
            self.enter(Phase::Sleeping);
            if self.sleep_or_cancel(self.settings.interval).await {
                break;
            }
        }
        self.enter(Phase::Cancelled);
        info!("Stopping on signal");
    }

    /// One cycle with the outcome logged.
    pub async fn run_logged(&mut self) {
        let t0 = Instant::now();
        match self.run_cycle().await {
            Ok(report) if report.fresh > 0 => info!(
                extracted = report.extracted,
                fresh = report.fresh,
                delivered = report.delivered,
                failed = report.failed,
                cap_applied = report.cap_applied,
                elapsed_ms = t0.elapsed().as_millis() as u64,
                "Cycle complete"
            ),
            Ok(report) => debug!(extracted = report.extracted, "No new items"),
            Err(CycleError::Fetch(e)) => {
                error!(url = %self.settings.source_url, error = %e, "Fetching listing failed")
            }
            Err(e) => error!(error = %e, "Cycle aborted"),
        }
    }

    /// Fetch, diff and deliver once.
    #[instrument(level = "info", skip_all)]
    pub async fn run_cycle(&mut self) -> Result<CycleReport, CycleError> {
        let mut report = CycleReport::default();

        self.enter(Phase::Fetching);
        let html = self.source.fetch(self.settings.source_url.as_str()).await?;
        let items = self.extractor.extract(&html, &self.settings.source_url);
        report.extracted = items.len();
        if items.is_empty() {
            warn!(bytes = html.len(), "Listing page produced no items");
            self.enter(Phase::Idle);
            return Ok(report);
        }

        self.enter(Phase::Diffing);
        let mut fresh = Vec::new();
        for item in items {
            if self.store.is_new(&item.url).await? {
                fresh.push(item);
            }
        }
        report.fresh = fresh.len();

        let cap = self.take_first_run_cap();
        report.cap_applied = cap.is_some();

        if !fresh.is_empty() {
            info!(count = fresh.len(), ?cap, "Found new items");
            let batch = plan_delivery(fresh, cap);
            self.enter(Phase::Delivering);
            self.deliver_batch(batch, &mut report).await;
        }

        self.enter(Phase::Idle);
        Ok(report)
    }

    fn take_first_run_cap(&mut self) -> Option<usize> {
        let pending = std::mem::take(&mut self.first_run_pending);
        (pending && self.settings.first_run_cap > 0).then_some(self.settings.first_run_cap)
    }

    async fn deliver_batch(&mut self, batch: Vec<Item>, report: &mut CycleReport) {
        let total = batch.len();
        for (i, item) in batch.into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                info!(remaining = total - i, "Cancelled; leaving remaining items for next run");
                return;
            }

            let title = decode_title(item.title_or_url());
            let sent = self
                .notifier
                .deliver(&title, &item.url, &self.settings.display_name)
                .await;

            match sent {
                Ok(()) => {
                    report.delivered += 1;
                    match self.store.mark_posted(&item.url, &title).await {
                        Ok(()) => info!(url = %item.url, %title, "Posted"),
                        Err(e) => error!(
                            url = %item.url,
                            error = %e,
                            "Posted but not recorded; will be offered again next cycle"
                        ),
                    }
                    if i + 1 < total && self.sleep_or_cancel(self.settings.pacing).await {
                        info!(remaining = total - i - 1, "Cancelled; leaving remaining items for next run");
                        return;
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    error!(url = %item.url, error = %e, "Posting failed");
                }
            }
        }
    }

    /// Wait for `duration`; returns `true` if cancelled meanwhile.
    async fn sleep_or_cancel(&self, duration: Duration) -> bool {
        if duration.is_zero() {
            return self.cancel.is_cancelled();
        }
        tokio::select! {
            _ = self.cancel.cancelled() => true,
            _ = sleep(duration) => self.cancel.is_cancelled(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotifyError;
    use regex::Regex;
    use std::collections::{HashSet, VecDeque};
    use std::sync::Mutex;
    use tempfile::TempDir;

    const BASE: &str = "https://www.seaofthieves.com/ru/news";

    fn url_for(slug: &str) -> String {
        format!("{BASE}/{slug}")
    }

    fn listing(slugs: &[&str]) -> String {
        let links: String = slugs
            .iter()
            .map(|s| format!(r#"<li><a href="/ru/news/{s}">Story {s}</a></li>"#))
            .collect();
        format!("<html><body><ul>{links}</ul></body></html>")
    }

    #[derive(Default)]
    struct FakeSource {
        pages: Mutex<VecDeque<Result<String, FetchError>>>,
        fetches: Mutex<usize>,
    }

    impl FakeSource {
        fn with(pages: Vec<Result<String, FetchError>>) -> Self {
            Self {
                pages: Mutex::new(pages.into()),
                fetches: Mutex::new(0),
            }
        }

        fn fetches(&self) -> usize {
            *self.fetches.lock().unwrap()
        }
    }

    impl PageSource for FakeSource {
        async fn fetch(&self, _url: &str) -> Result<String, FetchError> {
            *self.fetches.lock().unwrap() += 1;
            self.pages
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(String::new()))
        }
    }

    #[derive(Default)]
    struct FakeNotifier {
        sent: Mutex<Vec<(String, String, String)>>,
        failing: Mutex<HashSet<String>>,
        cancel_on_send: Option<CancellationToken>,
        close_on_send: Option<StateStore>,
    }

    impl FakeNotifier {
        fn failing(urls: &[String]) -> Self {
            Self {
                failing: Mutex::new(urls.iter().cloned().collect()),
                ..Default::default()
            }
        }

        fn sent_urls(&self) -> Vec<String> {
            self.sent.lock().unwrap().iter().map(|(_, u, _)| u.clone()).collect()
        }

        fn sent_titles(&self) -> Vec<String> {
            self.sent.lock().unwrap().iter().map(|(t, _, _)| t.clone()).collect()
        }

        fn recover(&self) {
            self.failing.lock().unwrap().clear();
        }
    }

    impl Notify for FakeNotifier {
        async fn deliver(&self, title: &str, url: &str, username: &str) -> Result<(), NotifyError> {
            if let Some(token) = &self.cancel_on_send {
                token.cancel();
            }
            if let Some(store) = &self.close_on_send {
                store.close().await;
            }
            if self.failing.lock().unwrap().contains(url) {
                return Err(NotifyError::Status {
                    status: 500,
                    body: "boom".to_string(),
                });
            }
            self.sent
                .lock()
                .unwrap()
                .push((title.to_string(), url.to_string(), username.to_string()));
            Ok(())
        }
    }

    fn settings(cap: usize) -> PollSettings {
        PollSettings {
            source_url: Url::parse(BASE).unwrap(),
            display_name: "Test Bot".to_string(),
            interval: Duration::from_secs(3600),
            first_run_cap: cap,
            pacing: Duration::ZERO,
        }
    }

    async fn store() -> (TempDir, StateStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path().join("state.db")).await.unwrap();
        (dir, store)
    }

    fn poll_loop(
        cap: usize,
        source: FakeSource,
        notifier: FakeNotifier,
        store: StateStore,
        cancel: CancellationToken,
    ) -> PollLoop<FakeSource, FakeNotifier> {
        PollLoop::new(
            settings(cap),
            ListingExtractor::new(Regex::new("/ru/news/").unwrap()),
            source,
            notifier,
            store,
            cancel,
        )
    }

    #[test]
    fn test_plan_delivery_truncates_then_reverses() {
        let items: Vec<Item> = ["a", "b", "c", "d"]
            .iter()
            .map(|s| Item::new(url_for(s), None))
            .collect();

        let planned = plan_delivery(items.clone(), Some(3));
        let urls: Vec<_> = planned.iter().map(|i| i.url.clone()).collect();
        assert_eq!(urls, vec![url_for("c"), url_for("b"), url_for("a")]);

        let planned = plan_delivery(items, None);
        assert_eq!(planned.len(), 4);
        assert_eq!(planned[0].url, url_for("d"));
    }

    #[tokio::test]
    async fn test_first_cycle_cap_delivers_first_n_oldest_first() {
        let slugs = ["s0", "s1", "s2", "s3", "s4", "s5", "s6", "s7", "s8", "s9"];
        let (_dir, store) = store().await;
        let source = FakeSource::with(vec![Ok(listing(&slugs))]);
        let mut poller = poll_loop(3, source, FakeNotifier::default(), store.clone(), CancellationToken::new());

        let report = poller.run_cycle().await.unwrap();

        assert_eq!(report.extracted, 10);
        assert_eq!(report.fresh, 10);
        assert_eq!(report.delivered, 3);
        assert!(report.cap_applied);
        assert_eq!(
            poller.notifier.sent_urls(),
            vec![url_for("s2"), url_for("s1"), url_for("s0")]
        );
        assert_eq!(store.count().await.unwrap(), 3);
        assert!(store.is_new(&url_for("s3")).await.unwrap());
        assert_eq!(poller.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn test_cap_is_not_reapplied_on_later_cycles() {
        let slugs = ["s0", "s1", "s2", "s3", "s4", "s5", "s6", "s7", "s8", "s9"];
        let (_dir, store) = store().await;
        let source = FakeSource::with(vec![Ok(listing(&slugs)), Ok(listing(&slugs))]);
        let mut poller = poll_loop(3, source, FakeNotifier::default(), store.clone(), CancellationToken::new());

        poller.run_cycle().await.unwrap();
        let second = poller.run_cycle().await.unwrap();

        assert!(!second.cap_applied);
        assert_eq!(second.fresh, 7);
        assert_eq!(second.delivered, 7);
        let sent = poller.notifier.sent_urls();
        assert_eq!(sent.len(), 10);
        assert_eq!(sent[3], url_for("s9"));
        assert_eq!(sent[9], url_for("s3"));
        assert_eq!(store.count().await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_zero_cap_delivers_everything() {
        let (_dir, store) = store().await;
        let source = FakeSource::with(vec![Ok(listing(&["a", "b", "c", "d", "e"]))]);
        let mut poller = poll_loop(0, source, FakeNotifier::default(), store, CancellationToken::new());

        let report = poller.run_cycle().await.unwrap();
        assert!(!report.cap_applied);
        assert_eq!(report.delivered, 5);
        assert_eq!(poller.notifier.sent_urls()[0], url_for("e"));
    }

    #[tokio::test]
    async fn test_failed_item_is_isolated_and_not_recorded() {
        let (_dir, store) = store().await;
        let source = FakeSource::with(vec![Ok(listing(&["c", "b", "a"]))]);
        let notifier = FakeNotifier::failing(&[url_for("b")]);
        let mut poller = poll_loop(0, source, notifier, store.clone(), CancellationToken::new());

        let report = poller.run_cycle().await.unwrap();

        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(poller.notifier.sent_urls(), vec![url_for("a"), url_for("c")]);
        assert!(!store.is_new(&url_for("a")).await.unwrap());
        assert!(store.is_new(&url_for("b")).await.unwrap());
        assert!(!store.is_new(&url_for("c")).await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_item_is_retried_next_cycle() {
        let (_dir, store) = store().await;
        let page = listing(&["c", "b", "a"]);
        let source = FakeSource::with(vec![Ok(page.clone()), Ok(page)]);
        let notifier = FakeNotifier::failing(&[url_for("b")]);
        let mut poller = poll_loop(0, source, notifier, store.clone(), CancellationToken::new());

        poller.run_cycle().await.unwrap();
        poller.notifier.recover();
        let second = poller.run_cycle().await.unwrap();

        assert_eq!(second.fresh, 1);
        assert_eq!(second.delivered, 1);
        assert_eq!(poller.notifier.sent_urls().last(), Some(&url_for("b")));
        assert_eq!(store.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_known_items_are_skipped() {
        let (_dir, store) = store().await;
        store.mark_posted(&url_for("a"), "Story a").await.unwrap();
        let source = FakeSource::with(vec![Ok(listing(&["b", "a"]))]);
        let mut poller = poll_loop(8, source, FakeNotifier::default(), store, CancellationToken::new());

        let report = poller.run_cycle().await.unwrap();
        assert_eq!(report.extracted, 2);
        assert_eq!(report.fresh, 1);
        assert_eq!(poller.notifier.sent_urls(), vec![url_for("b")]);
    }

    #[tokio::test]
    async fn test_fetch_failure_has_no_side_effects_and_keeps_cap_armed() {
        let slugs = ["a", "b", "c", "d"];
        let (_dir, store) = store().await;
        let source = FakeSource::with(vec![
            Err(FetchError::Status {
                url: BASE.to_string(),
                status: 503,
            }),
            Ok(listing(&slugs)),
        ]);
        let mut poller = poll_loop(2, source, FakeNotifier::default(), store.clone(), CancellationToken::new());

        let err = poller.run_cycle().await.unwrap_err();
        assert!(matches!(err, CycleError::Fetch(_)));
        assert!(poller.notifier.sent_urls().is_empty());
        assert_eq!(store.count().await.unwrap(), 0);

        let report = poller.run_cycle().await.unwrap();
        assert!(report.cap_applied);
        assert_eq!(poller.notifier.sent_urls(), vec![url_for("b"), url_for("a")]);
    }

    #[tokio::test]
    async fn test_empty_listing_keeps_cap_armed() {
        let (_dir, store) = store().await;
        let source = FakeSource::with(vec![
            Ok("<html><body>maintenance</body></html>".to_string()),
            Ok(listing(&["a", "b", "c"])),
        ]);
        let mut poller = poll_loop(1, source, FakeNotifier::default(), store, CancellationToken::new());

        let first = poller.run_cycle().await.unwrap();
        assert_eq!(first, CycleReport::default());

        let second = poller.run_cycle().await.unwrap();
        assert!(second.cap_applied);
        assert_eq!(poller.notifier.sent_urls(), vec![url_for("a")]);
    }

    #[tokio::test]
    async fn test_cap_consumed_even_when_nothing_is_new() {
        let (_dir, store) = store().await;
        store.mark_posted(&url_for("a"), "Story a").await.unwrap();
        let source = FakeSource::with(vec![
            Ok(listing(&["a"])),
            Ok(listing(&["d", "c", "b", "a"])),
        ]);
        let mut poller = poll_loop(1, source, FakeNotifier::default(), store, CancellationToken::new());

        let first = poller.run_cycle().await.unwrap();
        assert!(first.cap_applied);
        assert_eq!(first.delivered, 0);

        let second = poller.run_cycle().await.unwrap();
        assert!(!second.cap_applied);
        assert_eq!(second.delivered, 3);
    }

    #[tokio::test]
    async fn test_titles_are_decoded_and_fall_back_to_url() {
        let (_dir, store) = store().await;
        let page = r#"
            <a href="/ru/news/double">Tom &amp;amp; Jerry</a>
            <div><a href="/ru/news/bare">ok</a></div>
        "#;
        let source = FakeSource::with(vec![Ok(page.to_string())]);
        let mut poller = poll_loop(0, source, FakeNotifier::default(), store.clone(), CancellationToken::new());

        poller.run_cycle().await.unwrap();

        assert_eq!(
            poller.notifier.sent_titles(),
            vec![url_for("bare"), "Tom & Jerry".to_string()]
        );
        let record = store.get(&url_for("double")).await.unwrap().unwrap();
        assert_eq!(record.title, "Tom & Jerry");
        let sent = poller.notifier.sent.lock().unwrap();
        assert!(sent.iter().all(|(_, _, user)| user == "Test Bot"));
    }

    #[tokio::test]
    async fn test_store_write_failure_does_not_abort_cycle() {
        let (_dir, store) = store().await;
        let source = FakeSource::with(vec![Ok(listing(&["c", "b", "a"]))]);
        let notifier = FakeNotifier {
            close_on_send: Some(store.clone()),
            ..Default::default()
        };
        let mut poller = poll_loop(0, source, notifier, store.clone(), CancellationToken::new());

        let report = poller.run_cycle().await.unwrap();

        assert_eq!(report.fresh, 3);
        assert_eq!(report.delivered, 3);
        assert_eq!(report.failed, 0);
        assert_eq!(
            poller.notifier.sent_urls(),
            vec![url_for("a"), url_for("b"), url_for("c")]
        );
        assert!(store.is_new(&url_for("a")).await.is_err());
    }

    #[tokio::test]
    async fn test_successful_deliveries_are_paced() {
        let (_dir, store) = store().await;
        let source = FakeSource::with(vec![Ok(listing(&["c", "b", "a"]))]);
        let mut poller = poll_loop(0, source, FakeNotifier::default(), store, CancellationToken::new());
        poller.settings.pacing = Duration::from_millis(150);

        let t0 = Instant::now();
        let report = poller.run_cycle().await.unwrap();

        assert_eq!(report.delivered, 3);
        assert!(t0.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_failed_delivery_is_not_paced() {
        let (_dir, store) = store().await;
        let source = FakeSource::with(vec![Ok(listing(&["b", "a"]))]);
        let notifier = FakeNotifier::failing(&[url_for("a"), url_for("b")]);
        let mut poller = poll_loop(0, source, notifier, store, CancellationToken::new());
        poller.settings.pacing = Duration::from_secs(30);

        let report = tokio::time::timeout(Duration::from_secs(5), poller.run_cycle())
            .await
            .expect("failures should not wait for the pacing delay")
            .unwrap();
        assert_eq!(report.failed, 2);
    }

    #[tokio::test]
    async fn test_cancel_during_pacing_leaves_rest_unposted() {
        let (_dir, store) = store().await;
        let cancel = CancellationToken::new();
        let source = FakeSource::with(vec![Ok(listing(&["c", "b", "a"]))]);
        let mut poller = poll_loop(0, source, FakeNotifier::default(), store.clone(), cancel.clone());
        poller.settings.pacing = Duration::from_secs(30);

        let trigger = async {
            sleep(Duration::from_millis(200)).await;
            cancel.cancel();
        };
        let (report, ()) = tokio::time::timeout(Duration::from_secs(5), async {
            tokio::join!(poller.run_cycle(), trigger)
        })
        .await
        .expect("cancellation should cut the pacing delay short");

        assert_eq!(report.unwrap().delivered, 1);
        assert_eq!(poller.notifier.sent_urls(), vec![url_for("a")]);
        assert!(!store.is_new(&url_for("a")).await.unwrap());
        assert!(store.is_new(&url_for("b")).await.unwrap());
        assert!(store.is_new(&url_for("c")).await.unwrap());
    }

    #[tokio::test]
    async fn test_run_returns_immediately_when_already_cancelled() {
        let (_dir, store) = store().await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut poller = poll_loop(0, FakeSource::default(), FakeNotifier::default(), store, cancel);

        poller.run().await;

        assert_eq!(poller.source.fetches(), 0);
        assert_eq!(poller.phase(), Phase::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_during_delivery_finishes_current_item_then_stops() {
        let (_dir, store) = store().await;
        let cancel = CancellationToken::new();
        let source = FakeSource::with(vec![Ok(listing(&["c", "b", "a"]))]);
        let notifier = FakeNotifier {
            cancel_on_send: Some(cancel.clone()),
            ..Default::default()
        };
        let mut poller = poll_loop(0, source, notifier, store.clone(), cancel);

        tokio::time::timeout(Duration::from_secs(5), poller.run())
            .await
            .expect("loop should stop without sleeping the interval");

        assert_eq!(poller.notifier.sent_urls(), vec![url_for("a")]);
        assert!(!store.is_new(&url_for("a")).await.unwrap());
        assert!(store.is_new(&url_for("b")).await.unwrap());
        assert_eq!(poller.source.fetches(), 1);
        assert_eq!(poller.phase(), Phase::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_interval_sleep() {
        let (_dir, store) = store().await;
        let cancel = CancellationToken::new();
        let source = FakeSource::with(vec![Ok(listing(&["a"]))]);
        let mut poller = poll_loop(0, source, FakeNotifier::default(), store, cancel.clone());

        let trigger = async {
            sleep(Duration::from_millis(200)).await;
            cancel.cancel();
        };
        tokio::time::timeout(Duration::from_secs(5), async {
            tokio::join!(poller.run(), trigger);
        })
        .await
        .expect("cancellation should cut the hour-long sleep short");

        assert_eq!(poller.source.fetches(), 1);
        assert_eq!(poller.notifier.sent_urls(), vec![url_for("a")]);
        assert_eq!(poller.phase(), Phase::Cancelled);
    }
}
