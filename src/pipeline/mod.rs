//! # Windowed backfill pipeline
//!
//! Plans which time ranges still need fetching, pages through them, stores
//! records idempotently and folds them into period/category statistics.
//!
//! ## Schema Reference
//!
//! All types match the SQL schema in `/sql/`:
//! - `tron_transactions` → `TransactionRecord`
//! - `tron_energy_stats` → `PeriodStat`
//! - `tron_contract_stats` → `CategoryStat`
//! - `tron_currency_rates` → `CurrencyRate`
//! - `backfill_windows` → `WindowRecord`
//!
//! ## Module Organization
//!
//! - `types` - Record and statistic shapes, bucket keys
//! - `windows` - Interval planning and the backward window sweep
//! - `db` - `LedgerStore` trait and its SQLite implementation
//! - `aggregation` - Statistics generation
//! - `engine` - `BackfillEngine`, ties the above to a `LedgerSource`

pub mod aggregation;
pub mod db;
pub mod engine;
pub mod types;
pub mod windows;

pub use db::{LedgerStore, SqliteLedgerStore, StoreError};
pub use engine::{BackfillEngine, BackfillOptions, BackfillReport};
pub use types::{CategoryStat, Granularity, PeriodStat, TransactionRecord, TxStatus};
pub use windows::{CoverageMode, Lookback};
