//! Canonical record shapes shared by the store, the planner and aggregation
//!
//! Tables these map onto live in `/sql/`:
//! - `tron_transactions` → `TransactionRecord`
//! - `tron_energy_stats` → `PeriodStat`
//! - `tron_contract_stats` → `CategoryStat`
//! - `tron_currency_rates` → `CurrencyRate`
//! - `backfill_windows` → `WindowRecord`

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

const HOUR_MS: i64 = 60 * 60 * 1000;
const DAY_MS: i64 = 24 * HOUR_MS;

/// Outcome of a ledger operation as reported upstream (`contractRet`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Success,
    Failed,
}

impl TxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Success => "success",
            TxStatus::Failed => "failed",
        }
    }

    /// Anything other than "success" is stored as failed
    pub fn from_db(s: &str) -> Self {
        match s {
            "success" => TxStatus::Success,
            _ => TxStatus::Failed,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TxStatus::Success)
    }
}

/// Resource cost breakdown (`cost` object upstream)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub fee: f64,
    pub net_fee: f64,
    pub energy_fee: f64,
    pub energy_usage: f64,
    pub energy_usage_total: f64,
    pub origin_energy_usage: f64,
    pub energy_penalty_total: f64,
    pub net_usage: f64,
}

/// Smart-contract invocation metadata (`trigger_info` object upstream)
///
/// Empty strings everywhere for non-contract transactions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriggerInfo {
    pub method: String,
    pub method_id: String,
    pub method_name: String,
    pub contract_address: String,
    pub parameter_to: String,
    pub parameter_value: String,
}

/// Normalized transaction, primary key `hash`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub hash: String,
    pub wallet: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    pub block: i64,
    pub contract_type: i64,
    pub status: TxStatus,
    pub amount: f64,
    pub cost: CostBreakdown,
    pub trigger: TriggerInfo,
    /// Raw upstream payload, kept verbatim
    pub orig_query_json: String,
}

/// Per-bucket statistic, primary key (time_period, wallet)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodStat {
    pub time_period: String,
    pub wallet: String,
    /// Earliest contributing transaction timestamp (not the calendar bound)
    pub start_timestamp: i64,
    /// Latest contributing transaction timestamp
    pub end_timestamp: i64,
    pub total_transactions: i64,
    pub successful_transactions: i64,
    pub failed_transactions: i64,
    pub total_fee: f64,
    pub total_net_fee: f64,
    pub total_energy_fee: f64,
    pub total_energy_usage: f64,
    pub total_energy_usage_total: f64,
    pub total_energy_penalty: f64,
    pub total_net_usage: f64,
}

impl PeriodStat {
    pub fn new(time_period: String, wallet: String, timestamp: i64) -> Self {
        Self {
            time_period,
            wallet,
            start_timestamp: timestamp,
            end_timestamp: timestamp,
            total_transactions: 0,
            successful_transactions: 0,
            failed_transactions: 0,
            total_fee: 0.0,
            total_net_fee: 0.0,
            total_energy_fee: 0.0,
            total_energy_usage: 0.0,
            total_energy_usage_total: 0.0,
            total_energy_penalty: 0.0,
            total_net_usage: 0.0,
        }
    }
}

/// Per-bucket, per-category statistic, primary key (time_period, wallet, contract_type)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryStat {
    pub time_period: String,
    pub wallet: String,
    pub contract_type: i64,
    pub transaction_count: i64,
    pub total_fee: f64,
    pub total_energy_fee: f64,
    pub total_energy_usage: f64,
}

/// Daily price snapshot, primary key (date, symbol)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencyRate {
    pub timestamp: i64,
    pub date: String,
    pub symbol: String,
    pub price_usdt: f64,
    pub volume_24h: f64,
    pub change_24h: f64,
}

/// One row of the window completion ledger
#[derive(Debug, Clone, PartialEq)]
pub struct WindowRecord {
    pub window_start: i64,
    pub window_end: i64,
    pub completed: bool,
    pub record_count: i64,
    pub fetched_at: i64,
}

/// Result of a batch upsert: per-record failures are counted, not raised
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    pub success: usize,
    pub errors: usize,
}

impl UpsertSummary {
    pub fn merge(&mut self, other: UpsertSummary) {
        self.success += other.success;
        self.errors += other.errors;
    }
}

/// Aggregation bucket granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum Granularity {
    Hour,
    Day,
    Month,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Hour => "hour",
            Granularity::Day => "day",
            Granularity::Month => "month",
        }
    }

    /// Bucket key for a millisecond timestamp, UTC
    ///
    /// hour → `YYYY-MM-DD_HH`, day → `YYYY-MM-DD`, month → `YYYY-MM`.
    /// `None` when the timestamp is outside chrono's representable range.
    pub fn period_key(&self, timestamp_ms: i64) -> Option<String> {
        let dt = DateTime::<Utc>::from_timestamp_millis(timestamp_ms)?;
        let key = match self {
            Granularity::Hour => dt.format("%Y-%m-%d_%H").to_string(),
            Granularity::Day => dt.format("%Y-%m-%d").to_string(),
            Granularity::Month => dt.format("%Y-%m").to_string(),
        };
        Some(key)
    }

    /// Inclusive calendar bounds (ms) of the bucket containing `timestamp_ms`
    ///
    /// `None` exactly when `period_key` is `None`, or when the bucket end
    /// does not fit in an i64.
    pub fn bucket_bounds(&self, timestamp_ms: i64) -> Option<(i64, i64)> {
        let dt = DateTime::<Utc>::from_timestamp_millis(timestamp_ms)?;
        let (start, len) = match self {
            Granularity::Hour => (timestamp_ms - timestamp_ms.rem_euclid(HOUR_MS), HOUR_MS),
            Granularity::Day => (timestamp_ms - timestamp_ms.rem_euclid(DAY_MS), DAY_MS),
            Granularity::Month => {
                let (year, month) = (dt.year(), dt.month());
                let (next_year, next_month) = if month == 12 {
                    (year + 1, 1)
                } else {
                    (year, month + 1)
                };
                let start = month_start_millis(year, month)?;
                let next = month_start_millis(next_year, next_month)?;
                return Some((start, next - 1));
            }
        };
        let end = start.checked_add(len - 1)?;
        Some((start, end))
    }
}

fn month_start_millis(year: i32, month: u32) -> Option<i64> {
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2023-11-14T22:13:20Z
    const TS: i64 = 1_700_000_000_000;

    #[test]
    fn test_period_keys_utc() {
        assert_eq!(Granularity::Hour.period_key(TS).as_deref(), Some("2023-11-14_22"));
        assert_eq!(Granularity::Day.period_key(TS).as_deref(), Some("2023-11-14"));
        assert_eq!(Granularity::Month.period_key(TS).as_deref(), Some("2023-11"));
    }

    #[test]
    fn test_out_of_range_timestamp_has_no_bucket() {
        for granularity in [Granularity::Hour, Granularity::Day, Granularity::Month] {
            assert_eq!(granularity.period_key(i64::MAX), None);
            assert_eq!(granularity.bucket_bounds(i64::MAX), None);
            assert_eq!(granularity.period_key(i64::MIN), None);
            assert_eq!(granularity.bucket_bounds(i64::MIN), None);
        }
    }

    #[test]
    fn test_day_key_boundaries() {
        // Last millisecond of 2023-11-14 and first of 2023-11-15
        let (start, end) = Granularity::Day.bucket_bounds(TS).unwrap();
        assert_eq!(Granularity::Day.period_key(start).as_deref(), Some("2023-11-14"));
        assert_eq!(Granularity::Day.period_key(end).as_deref(), Some("2023-11-14"));
        assert_eq!(Granularity::Day.period_key(end + 1).as_deref(), Some("2023-11-15"));
        assert_eq!(end - start + 1, DAY_MS);
    }

    #[test]
    fn test_hour_bounds_contain_timestamp() {
        let (start, end) = Granularity::Hour.bucket_bounds(TS).unwrap();
        assert!(start <= TS && TS <= end);
        assert_eq!(end - start + 1, HOUR_MS);
        assert_eq!(Granularity::Hour.period_key(start), Granularity::Hour.period_key(end));
    }

    #[test]
    fn test_month_bounds_december_rollover() {
        // 2023-12-31T23:59:59Z
        let ts = 1_704_067_199_000;
        let (start, end) = Granularity::Month.bucket_bounds(ts).unwrap();
        assert_eq!(Granularity::Month.period_key(start).as_deref(), Some("2023-12"));
        assert_eq!(Granularity::Month.period_key(end).as_deref(), Some("2023-12"));
        assert_eq!(Granularity::Month.period_key(end + 1).as_deref(), Some("2024-01"));
    }

    #[test]
    fn test_status_round_trip_through_db_text() {
        assert_eq!(TxStatus::from_db(TxStatus::Success.as_str()), TxStatus::Success);
        assert_eq!(TxStatus::from_db("failed"), TxStatus::Failed);
        assert_eq!(TxStatus::from_db("REVERT"), TxStatus::Failed);
    }
}
