//! tronflow - incremental windowed backfill of Tron account transactions
//!
//! Fetches an account's transaction history from Tronscan in time windows,
//! stores it idempotently in SQLite and maintains per-period and
//! per-contract-type resource statistics.
//!
//! - `config` - `BackfillConfig` built once from the environment
//! - `fetch` - retrying Tronscan client behind the `LedgerSource` trait
//! - `normalizer` - raw JSON → `TransactionRecord`
//! - `pipeline` - window planning, storage, aggregation, the engine
//! - `rates` - currency-rate snapshot

pub mod config;
pub mod fetch;
pub mod normalizer;
pub mod pipeline;
pub mod rates;

pub use config::{BackfillConfig, ConfigError};
pub use fetch::{FetchError, LedgerSource, TronscanClient};
pub use pipeline::{BackfillEngine, BackfillOptions, BackfillReport, Granularity, Lookback};

/// Current wall-clock time in milliseconds since the Unix epoch
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
