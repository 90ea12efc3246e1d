//! Backfill interval planning and the backward window sweep
//!
//! The sweep starts at the most recent edge of the interval and walks back
//! towards its start in sub-windows. After a window that was fetched and
//! came back empty the window size doubles (capped at what is left of the
//! interval), so long quiet stretches of history cost few requests.
//!
//! All bounds are inclusive milliseconds.

pub const HOUR_MS: i64 = 60 * 60 * 1000;
pub const DAY_MS: i64 = 24 * HOUR_MS;

/// Requested lookback, measured back from "now"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookback {
    Hours(u32),
    Days(u32),
}

impl Lookback {
    pub fn as_millis(&self) -> i64 {
        match self {
            Lookback::Hours(h) => i64::from(*h) * HOUR_MS,
            Lookback::Days(d) => i64::from(*d) * DAY_MS,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Lookback::Hours(h) => format!("{} hour(s)", h),
            Lookback::Days(d) => format!("{} day(s)", d),
        }
    }
}

impl Default for Lookback {
    fn default() -> Self {
        Lookback::Days(1)
    }
}

/// How the planner decides a window needs no fetching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoverageMode {
    /// Any stored transaction inside the window counts as covered
    #[default]
    Presence,
    /// Only windows the completion ledger marks complete are covered
    Ledger,
}

impl CoverageMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoverageMode::Presence => "presence",
            CoverageMode::Ledger => "ledger",
        }
    }
}

/// Inclusive `[start, end]` range in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start: i64,
    pub end: i64,
}

impl Interval {
    pub fn len_ms(&self) -> i64 {
        self.end - self.start + 1
    }
}

/// Overall interval for one run
///
/// `end` is `now` and the interval spans `lookback_ms`, unless the newest
/// stored transaction is more recent than its start, in which case it starts
/// just after that. A `latest` beyond `now` is ignored. `None` when
/// nothing is left to fetch.
pub fn plan_interval(now: i64, lookback_ms: i64, latest: Option<i64>) -> Option<Interval> {
    let requested_start = now.saturating_sub(lookback_ms.max(1) - 1);
    let start = match latest {
        Some(latest) if latest <= now => requested_start.max(latest.saturating_add(1)),
        _ => requested_start,
    };

    if start > now {
        None
    } else {
        Some(Interval { start, end: now })
    }
}

pub type TimeWindow = Interval;

/// What happened to one window, fed back into the cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowOutcome {
    /// Already covered, nothing fetched
    Skipped,
    /// Fetched completely, with this many records
    Fetched(usize),
    /// At least one page could not be fetched
    Unavailable,
}

/// Backward sweep state: one cursor (next window end) and one window size
#[derive(Debug, Clone)]
pub struct WindowCursor {
    interval: Interval,
    next_end: i64,
    window_size: i64,
}

impl WindowCursor {
    pub fn new(interval: Interval, initial_window_ms: i64) -> Self {
        Self {
            interval,
            next_end: interval.end,
            window_size: initial_window_ms.max(1),
        }
    }

    /// Window to process next, `None` once the cursor has passed the interval start
    pub fn current(&self) -> Option<TimeWindow> {
        if self.next_end < self.interval.start {
            return None;
        }

        let start = self
            .next_end
            .saturating_sub(self.window_size - 1)
            .max(self.interval.start);

        Some(TimeWindow {
            start,
            end: self.next_end,
        })
    }

    /// Step past the current window
    ///
    /// An empty fetch doubles the window size, capped at the remaining
    /// interval. Skipped and unavailable windows leave the size unchanged.
    pub fn advance(&mut self, outcome: WindowOutcome) {
        let Some(window) = self.current() else {
            return;
        };

        self.next_end = window.start - 1;

        if outcome == WindowOutcome::Fetched(0) {
            let remaining = self.next_end - self.interval.start + 1;
            if remaining > 0 {
                self.window_size = self.window_size.saturating_mul(2).min(remaining);
            }
        }
    }

    pub fn window_size(&self) -> i64 {
        self.window_size
    }

    pub fn is_done(&self) -> bool {
        self.current().is_none()
    }
}
