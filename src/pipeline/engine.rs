//! Backfill engine - drives the window sweep against a source and a store
//!
//! ## Flow
//!
//! ```text
//! latest_timestamp() ──► plan_interval() ──► WindowCursor
//!                                                │
//!                  ┌─────────── per window ──────┘
//!                  ▼
//!        covered? ──yes──► skip (no network)
//!                  │no
//!                  ▼
//!        fetch_page() × N ──► normalize_page() ──► upsert_transactions()
//!                  │
//!                  ▼
//!        record_window() (completion ledger)
//!
//! after the sweep: refresh_statistics(batch) recomputes every touched bucket
//! from the store and replaces its period/category rows
//! ```
//!
//! Everything runs sequentially. The only suspension points are the upstream
//! requests, their retry delays, and the courtesy delay between pages.

use super::aggregation::{generate_statistics, summarize, touched_buckets, StatisticsSummary};
use super::db::{LedgerStore, StoreError};
use super::types::{Granularity, TransactionRecord, UpsertSummary, WindowRecord};
use super::windows::{
    plan_interval, CoverageMode, Interval, Lookback, TimeWindow, WindowCursor, WindowOutcome,
    DAY_MS,
};
use crate::config::BackfillConfig;
use crate::fetch::{FetchError, LedgerSource};
use crate::normalizer::normalize_page;
use std::sync::Arc;
use std::time::Duration;

/// Knobs for one engine, usually taken from `BackfillConfig`
#[derive(Debug, Clone)]
pub struct BackfillOptions {
    pub page_size: u32,
    pub page_delay: Duration,
    pub window_size_ms: i64,
    pub coverage_mode: CoverageMode,
    /// Start the interval just after the newest stored transaction
    pub resume_from_latest: bool,
}

impl BackfillOptions {
    pub fn from_config(config: &BackfillConfig) -> Self {
        Self {
            page_size: config.page_size.max(1),
            page_delay: config.page_delay(),
            window_size_ms: config.window_days.max(1) * DAY_MS,
            coverage_mode: config.coverage_mode,
            resume_from_latest: true,
        }
    }
}

/// What one run did
#[derive(Debug, Default)]
pub struct BackfillReport {
    /// `None` when storage was already up to date
    pub interval: Option<Interval>,
    pub windows_planned: usize,
    pub windows_skipped: usize,
    pub windows_fetched: usize,
    pub windows_empty: usize,
    pub windows_unavailable: usize,
    pub pages_fetched: usize,
    pub stored: UpsertSummary,
    /// Every normalized record fetched in this run
    pub batch: Vec<TransactionRecord>,
}

impl BackfillReport {
    pub fn processed(&self) -> usize {
        self.batch.len()
    }

    /// False if any window could not be fetched end to end
    pub fn is_complete(&self) -> bool {
        self.windows_unavailable == 0
    }
}

#[derive(Debug, Default)]
struct WindowFetch {
    records: Vec<TransactionRecord>,
    pages: usize,
    stored: UpsertSummary,
    error: Option<FetchError>,
}

pub struct BackfillEngine {
    source: Arc<dyn LedgerSource>,
    store: Arc<dyn LedgerStore>,
    wallet: String,
    options: BackfillOptions,

    /// Milliseconds since epoch (injectable for tests)
    now_fn: Box<dyn Fn() -> i64 + Send + Sync>,
}

impl BackfillEngine {
    pub fn new(
        source: Arc<dyn LedgerSource>,
        store: Arc<dyn LedgerStore>,
        wallet: impl Into<String>,
        options: BackfillOptions,
    ) -> Self {
        Self::new_with_timestamp_fn(
            source,
            store,
            wallet,
            options,
            Box::new(|| chrono::Utc::now().timestamp_millis()),
        )
    }

    pub fn new_with_timestamp_fn(
        source: Arc<dyn LedgerSource>,
        store: Arc<dyn LedgerStore>,
        wallet: impl Into<String>,
        options: BackfillOptions,
        now_fn: Box<dyn Fn() -> i64 + Send + Sync>,
    ) -> Self {
        Self {
            source,
            store,
            wallet: wallet.into(),
            options,
            now_fn,
        }
    }

    /// Sweep the lookback interval backward, fetching and storing uncovered windows
    ///
    /// Fetch failures never abort the run: the window is recorded as
    /// incomplete and the sweep moves on. Only a store read needed to plan
    /// the interval is fatal.
    pub async fn run(&self, lookback: Lookback) -> Result<BackfillReport, StoreError> {
        let now = (self.now_fn)();
        let mut report = BackfillReport::default();

        let latest = if self.options.resume_from_latest {
            self.store.latest_timestamp()?
        } else {
            None
        };
        let latest = match latest {
            Some(latest) if latest > now => {
                log::warn!(
                    "⚠️  Latest stored transaction {} is in the future, ignoring it for resume",
                    format_millis(latest)
                );
                None
            }
            Some(latest) => {
                log::info!("📍 Latest stored transaction: {}", format_millis(latest));
                Some(latest)
            }
            None => None,
        };

        let Some(interval) = plan_interval(now, lookback.as_millis(), latest) else {
            log::info!("✅ Storage is up to date, nothing to fetch");
            return Ok(report);
        };
        report.interval = Some(interval);

        log::info!(
            "🚀 Backfilling {} → {} (lookback {})",
            format_millis(interval.start),
            format_millis(interval.end),
            lookback.describe()
        );

        let mut cursor = WindowCursor::new(interval, self.options.window_size_ms);
        while let Some(window) = cursor.current() {
            report.windows_planned += 1;

            if self.is_covered(&window) {
                log::info!(
                    "⏭️  Window {} → {} already covered, skipping",
                    format_millis(window.start),
                    format_millis(window.end)
                );
                report.windows_skipped += 1;
                cursor.advance(WindowOutcome::Skipped);
                continue;
            }

            let fetch = self.fetch_window(&window).await;
            let count = fetch.records.len();
            report.pages_fetched += fetch.pages;
            report.stored.merge(fetch.stored);

            let outcome = match &fetch.error {
                Some(e) => {
                    log::warn!(
                        "⚠️  Window {} → {} incomplete after {} records: {}",
                        format_millis(window.start),
                        format_millis(window.end),
                        count,
                        e
                    );
                    report.windows_unavailable += 1;
                    WindowOutcome::Unavailable
                }
                None => {
                    log::info!(
                        "📥 Window {} → {}: {} records in {} page(s)",
                        format_millis(window.start),
                        format_millis(window.end),
                        count,
                        fetch.pages
                    );
                    report.windows_fetched += 1;
                    if count == 0 {
                        report.windows_empty += 1;
                    }
                    WindowOutcome::Fetched(count)
                }
            };

            self.record_window(&window, fetch.error.is_none(), count);
            report.batch.extend(fetch.records);
            cursor.advance(outcome);
        }

        Ok(report)
    }

    /// Recompute and replace statistics for every bucket the batch touches
    ///
    /// Each bucket is rebuilt from all stored transactions in its calendar
    /// range, so earlier runs' transactions in the same bucket still count.
    pub fn refresh_statistics(
        &self,
        batch: &[TransactionRecord],
        granularity: Granularity,
    ) -> Result<StatisticsSummary, StoreError> {
        if batch.is_empty() {
            log::info!("📊 No new transactions, statistics unchanged");
            return Ok(StatisticsSummary::default());
        }

        let buckets = touched_buckets(batch, granularity);
        let mut records = Vec::new();
        for (key, (start, end)) in &buckets {
            let stored = self.store.transactions_in_range(*start, *end)?;
            log::debug!("   ├─ Bucket {}: {} stored transactions", key, stored.len());
            records.extend(stored);
        }

        let (periods, categories) = generate_statistics(&records, granularity, &self.wallet);
        self.store.replace_period_stats(&periods)?;
        self.store.replace_category_stats(&categories)?;

        let summary = summarize(&periods, &categories);
        log::info!(
            "📊 Statistics written: {} {} period(s), {} category row(s)",
            summary.periods,
            granularity.as_str(),
            summary.categories
        );
        Ok(summary)
    }

    fn is_covered(&self, window: &TimeWindow) -> bool {
        let result = match self.options.coverage_mode {
            CoverageMode::Presence => self.store.has_coverage(window.start, window.end),
            CoverageMode::Ledger => self.store.is_window_complete(window.start, window.end),
        };

        result.unwrap_or_else(|e| {
            log::warn!("⚠️  Coverage check failed, fetching window anyway: {}", e);
            false
        })
    }

    /// Page through one window, storing each page as it arrives
    async fn fetch_window(&self, window: &TimeWindow) -> WindowFetch {
        let page_size = self.options.page_size;
        let mut fetch = WindowFetch::default();
        let mut offset: u64 = 0;

        loop {
            if fetch.pages > 0 && !self.options.page_delay.is_zero() {
                tokio::time::sleep(self.options.page_delay).await;
            }

            let page = match self
                .source
                .fetch_page(window.start, window.end, page_size, offset)
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    fetch.error = Some(e);
                    break;
                }
            };
            fetch.pages += 1;

            let received = page.records.len();
            if received == 0 {
                break;
            }

            let records = normalize_page(&page.records, &self.wallet);
            let stored = self.store.upsert_transactions(&records);
            log::debug!(
                "   ├─ offset {}: {} records (total {}), stored {} / errors {}",
                offset,
                received,
                page.total,
                stored.success,
                stored.errors
            );
            fetch.stored.merge(stored);
            fetch.records.extend(records);

            let reached_total = page.total > 0 && fetch.records.len() as u64 >= page.total;
            if received < page_size as usize || reached_total {
                break;
            }
            offset += u64::from(page_size);
        }

        fetch
    }

    fn record_window(&self, window: &TimeWindow, completed: bool, record_count: usize) {
        let entry = WindowRecord {
            window_start: window.start,
            window_end: window.end,
            completed,
            record_count: record_count as i64,
            fetched_at: (self.now_fn)(),
        };

        if let Err(e) = self.store.record_window(&entry) {
            log::warn!("⚠️  Failed to record window in ledger: {}", e);
        }
    }
}

/// `YYYY-MM-DD HH:MM:SS` UTC, or the raw value if out of range
pub fn format_millis(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| timestamp_ms.to_string())
}
