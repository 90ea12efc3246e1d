//! Idempotent SQLite store for transactions, statistics and the window ledger
//!
//! All writes are keyed upserts, so a killed run leaves the database in a
//! valid state and the next run simply overwrites what it re-fetches.
//!
//! Tables (see `/sql/`):
//! - `tron_transactions` - INSERT OR REPLACE on hash
//! - `tron_energy_stats` - UPSERT on (time_period, wallet), full replace
//! - `tron_contract_stats` - UPSERT on (time_period, wallet, contract_type), full replace
//! - `tron_currency_rates` - UPSERT on (date, symbol)
//! - `backfill_windows` - UPSERT on (wallet, window_start, window_end)

use super::types::{
    CategoryStat, CostBreakdown, CurrencyRate, PeriodStat, TransactionRecord, TriggerInfo,
    TxStatus, UpsertSummary, WindowRecord,
};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

/// Schema files, applied in order. Every statement uses IF NOT EXISTS.
const SCHEMA_MIGRATIONS: &[(&str, &str)] = &[
    ("01_tron_transactions.sql", include_str!("../../sql/01_tron_transactions.sql")),
    ("02_tron_energy_stats.sql", include_str!("../../sql/02_tron_energy_stats.sql")),
    ("03_tron_contract_stats.sql", include_str!("../../sql/03_tron_contract_stats.sql")),
    ("04_tron_currency_rates.sql", include_str!("../../sql/04_tron_currency_rates.sql")),
    ("05_backfill_windows.sql", include_str!("../../sql/05_backfill_windows.sql")),
];

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store connection lock poisoned")]
    Poisoned,
}

/// Keyed persistent store used by the backfill engine
///
/// Scoped to a single account: every query filters on the wallet the store
/// was opened for.
pub trait LedgerStore: Send + Sync {
    /// True iff at least one stored transaction has `start <= timestamp <= end`
    ///
    /// A cheap skip heuristic, not a completeness guarantee.
    fn has_coverage(&self, start: i64, end: i64) -> Result<bool, StoreError>;

    /// Insert-or-replace each record by hash
    ///
    /// A failing record is logged and counted; the rest of the batch still
    /// lands. All records share one SQL transaction.
    fn upsert_transactions(&self, records: &[TransactionRecord]) -> UpsertSummary;

    /// Most recent stored transaction timestamp, used to anchor incremental runs
    fn latest_timestamp(&self) -> Result<Option<i64>, StoreError>;

    /// All stored transactions with `start <= timestamp <= end`, ordered by (timestamp, hash)
    fn transactions_in_range(&self, start: i64, end: i64)
        -> Result<Vec<TransactionRecord>, StoreError>;

    /// Full replace per (time_period, wallet)
    fn replace_period_stats(&self, periods: &[PeriodStat]) -> Result<(), StoreError>;

    /// Full replace per (time_period, wallet, contract_type)
    fn replace_category_stats(&self, entries: &[CategoryStat]) -> Result<(), StoreError>;

    /// Record a processed window in the completion ledger
    ///
    /// Once a window has been marked completed it stays completed.
    fn record_window(&self, window: &WindowRecord) -> Result<(), StoreError>;

    /// True iff completed ledger windows cover `[start, end]` with no gap
    ///
    /// Rows from different runs may overlap or abut; their union counts.
    fn is_window_complete(&self, start: i64, end: i64) -> Result<bool, StoreError>;

    /// Upsert price snapshots by (date, symbol), returns rows written
    fn upsert_currency_rates(&self, rates: &[CurrencyRate]) -> Result<usize, StoreError>;
}

/// Apply schema migrations and WAL mode
///
/// Idempotent: safe to run on every startup.
pub fn run_schema_migrations(conn: &Connection) -> Result<(), StoreError> {
    let journal_mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    log::debug!("📊 SQLite journal mode: {}", journal_mode);

    log::info!("🔧 Running schema migrations");
    for (filename, sql) in SCHEMA_MIGRATIONS {
        log::debug!("   ├─ Executing: {}", filename);
        conn.execute_batch(sql)?;
    }
    log::info!("✅ Schema ready ({} migrations)", SCHEMA_MIGRATIONS.len());

    Ok(())
}

/// SQLite implementation of `LedgerStore`
pub struct SqliteLedgerStore {
    conn: Mutex<Connection>,
    wallet: String,
}

impl SqliteLedgerStore {
    /// Open (or create) the database at `db_path` and apply the schema
    ///
    /// Any failure here is a storage initialization failure: the caller must
    /// not start fetching.
    pub fn open(db_path: impl AsRef<Path>, wallet: impl Into<String>) -> Result<Self, StoreError> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)?;
        run_schema_migrations(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            wallet: wallet.into(),
        })
    }

    /// In-memory database with the full schema, for tests and dry runs
    pub fn open_in_memory(wallet: impl Into<String>) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        run_schema_migrations(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            wallet: wallet.into(),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn upsert_transactions_inner(
        &self,
        records: &[TransactionRecord],
    ) -> Result<UpsertSummary, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut summary = UpsertSummary::default();

        for record in records {
            let result = tx.execute(
                r#"
                INSERT OR REPLACE INTO tron_transactions (
                    hash, wallet, timestamp, block, contract_type, status, amount,
                    fee, net_fee, energy_fee, energy_usage, energy_usage_total,
                    origin_energy_usage, energy_penalty_total, net_usage,
                    trigger_method, trigger_method_id, trigger_method_name,
                    trigger_contract_address, trigger_parameter_to, trigger_parameter_value,
                    orig_query_json
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                          ?16, ?17, ?18, ?19, ?20, ?21, ?22)
                "#,
                params![
                    record.hash,
                    record.wallet,
                    record.timestamp,
                    record.block,
                    record.contract_type,
                    record.status.as_str(),
                    record.amount,
                    record.cost.fee,
                    record.cost.net_fee,
                    record.cost.energy_fee,
                    record.cost.energy_usage,
                    record.cost.energy_usage_total,
                    record.cost.origin_energy_usage,
                    record.cost.energy_penalty_total,
                    record.cost.net_usage,
                    record.trigger.method,
                    record.trigger.method_id,
                    record.trigger.method_name,
                    record.trigger.contract_address,
                    record.trigger.parameter_to,
                    record.trigger.parameter_value,
                    record.orig_query_json,
                ],
            );

            match result {
                Ok(_) => summary.success += 1,
                Err(e) => {
                    log::error!("❌ Failed to store transaction '{}': {}", record.hash, e);
                    summary.errors += 1;
                }
            }
        }

        tx.commit()?;
        Ok(summary)
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<TransactionRecord> {
    let status: String = row.get(5)?;
    Ok(TransactionRecord {
        hash: row.get(0)?,
        wallet: row.get(1)?,
        timestamp: row.get(2)?,
        block: row.get(3)?,
        contract_type: row.get(4)?,
        status: TxStatus::from_db(&status),
        amount: row.get(6)?,
        cost: CostBreakdown {
            fee: row.get(7)?,
            net_fee: row.get(8)?,
            energy_fee: row.get(9)?,
            energy_usage: row.get(10)?,
            energy_usage_total: row.get(11)?,
            origin_energy_usage: row.get(12)?,
            energy_penalty_total: row.get(13)?,
            net_usage: row.get(14)?,
        },
        trigger: TriggerInfo {
            method: row.get(15)?,
            method_id: row.get(16)?,
            method_name: row.get(17)?,
            contract_address: row.get(18)?,
            parameter_to: row.get(19)?,
            parameter_value: row.get(20)?,
        },
        orig_query_json: row.get(21)?,
    })
}

impl LedgerStore for SqliteLedgerStore {
    fn has_coverage(&self, start: i64, end: i64) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT 1 FROM tron_transactions
             WHERE wallet = ?1 AND timestamp BETWEEN ?2 AND ?3
             LIMIT 1",
        )?;
        Ok(stmt.exists(params![self.wallet, start, end])?)
    }

    fn upsert_transactions(&self, records: &[TransactionRecord]) -> UpsertSummary {
        if records.is_empty() {
            return UpsertSummary::default();
        }

        match self.upsert_transactions_inner(records) {
            Ok(summary) => {
                log::debug!(
                    "✅ Stored {} transactions ({} errors)",
                    summary.success,
                    summary.errors
                );
                summary
            }
            Err(e) => {
                // Connection or commit failure: nothing from this batch is durable
                log::error!("❌ Transaction batch of {} not stored: {}", records.len(), e);
                UpsertSummary {
                    success: 0,
                    errors: records.len(),
                }
            }
        }
    }

    fn latest_timestamp(&self) -> Result<Option<i64>, StoreError> {
        let conn = self.lock()?;
        let latest: Option<i64> = conn.query_row(
            "SELECT MAX(timestamp) FROM tron_transactions WHERE wallet = ?1",
            params![self.wallet],
            |row| row.get(0),
        )?;
        Ok(latest)
    }

    fn transactions_in_range(
        &self,
        start: i64,
        end: i64,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            r#"
            SELECT hash, wallet, timestamp, block, contract_type, status, amount,
                   fee, net_fee, energy_fee, energy_usage, energy_usage_total,
                   origin_energy_usage, energy_penalty_total, net_usage,
                   trigger_method, trigger_method_id, trigger_method_name,
                   trigger_contract_address, trigger_parameter_to, trigger_parameter_value,
                   orig_query_json
            FROM tron_transactions
            WHERE wallet = ?1 AND timestamp BETWEEN ?2 AND ?3
            ORDER BY timestamp ASC, hash ASC
            "#,
        )?;

        let rows = stmt.query_map(params![self.wallet, start, end], record_from_row)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    fn replace_period_stats(&self, periods: &[PeriodStat]) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        for period in periods {
            tx.execute(
                r#"
                INSERT INTO tron_energy_stats (
                    time_period, wallet, start_timestamp, end_timestamp,
                    total_transactions, successful_transactions, failed_transactions,
                    total_fee, total_net_fee, total_energy_fee, total_energy_usage,
                    total_energy_usage_total, total_energy_penalty, total_net_usage
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                ON CONFLICT(time_period, wallet) DO UPDATE SET
                    start_timestamp = excluded.start_timestamp,
                    end_timestamp = excluded.end_timestamp,
                    total_transactions = excluded.total_transactions,
                    successful_transactions = excluded.successful_transactions,
                    failed_transactions = excluded.failed_transactions,
                    total_fee = excluded.total_fee,
                    total_net_fee = excluded.total_net_fee,
                    total_energy_fee = excluded.total_energy_fee,
                    total_energy_usage = excluded.total_energy_usage,
                    total_energy_usage_total = excluded.total_energy_usage_total,
                    total_energy_penalty = excluded.total_energy_penalty,
                    total_net_usage = excluded.total_net_usage
                "#,
                params![
                    period.time_period,
                    period.wallet,
                    period.start_timestamp,
                    period.end_timestamp,
                    period.total_transactions,
                    period.successful_transactions,
                    period.failed_transactions,
                    period.total_fee,
                    period.total_net_fee,
                    period.total_energy_fee,
                    period.total_energy_usage,
                    period.total_energy_usage_total,
                    period.total_energy_penalty,
                    period.total_net_usage,
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn replace_category_stats(&self, entries: &[CategoryStat]) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        for entry in entries {
            tx.execute(
                r#"
                INSERT INTO tron_contract_stats (
                    time_period, wallet, contract_type, transaction_count,
                    total_fee, total_energy_fee, total_energy_usage
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(time_period, wallet, contract_type) DO UPDATE SET
                    transaction_count = excluded.transaction_count,
                    total_fee = excluded.total_fee,
                    total_energy_fee = excluded.total_energy_fee,
                    total_energy_usage = excluded.total_energy_usage
                "#,
                params![
                    entry.time_period,
                    entry.wallet,
                    entry.contract_type,
                    entry.transaction_count,
                    entry.total_fee,
                    entry.total_energy_fee,
                    entry.total_energy_usage,
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn record_window(&self, window: &WindowRecord) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO backfill_windows (
                wallet, window_start, window_end, completed, record_count, fetched_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(wallet, window_start, window_end) DO UPDATE SET
                completed = MAX(backfill_windows.completed, excluded.completed),
                record_count = excluded.record_count,
                fetched_at = excluded.fetched_at
            "#,
            params![
                self.wallet,
                window.window_start,
                window.window_end,
                window.completed,
                window.record_count,
                window.fetched_at,
            ],
        )?;
        Ok(())
    }

    fn is_window_complete(&self, start: i64, end: i64) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT window_start, window_end FROM backfill_windows
             WHERE wallet = ?1 AND completed = 1
               AND window_end >= ?2 AND window_start <= ?3
             ORDER BY window_start",
        )?;
        let rows = stmt.query_map(params![self.wallet, start, end], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
        })?;

        // Completed rows must chain from `start` to `end` with no gap
        let mut covered_until = start.saturating_sub(1);
        for row in rows {
            let (window_start, window_end) = row?;
            if window_start > covered_until.saturating_add(1) {
                return Ok(false);
            }
            covered_until = covered_until.max(window_end);
            if covered_until >= end {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn upsert_currency_rates(&self, rates: &[CurrencyRate]) -> Result<usize, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        for rate in rates {
            tx.execute(
                r#"
                INSERT INTO tron_currency_rates (
                    timestamp, date, symbol, price_usdt, volume_24h, change_24h
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(date, symbol) DO UPDATE SET
                    timestamp = excluded.timestamp,
                    price_usdt = excluded.price_usdt,
                    volume_24h = excluded.volume_24h,
                    change_24h = excluded.change_24h
                "#,
                params![
                    rate.timestamp,
                    rate.date,
                    rate.symbol,
                    rate.price_usdt,
                    rate.volume_24h,
                    rate.change_24h,
                ],
            )?;
        }

        tx.commit()?;
        Ok(rates.len())
    }
}

/// Look up a single stored transaction by hash (diagnostics and tests)
pub fn find_transaction(
    store: &SqliteLedgerStore,
    hash: &str,
) -> Result<Option<TransactionRecord>, StoreError> {
    let conn = store.lock()?;
    let record = conn
        .query_row(
            r#"
            SELECT hash, wallet, timestamp, block, contract_type, status, amount,
                   fee, net_fee, energy_fee, energy_usage, energy_usage_total,
                   origin_energy_usage, energy_penalty_total, net_usage,
                   trigger_method, trigger_method_id, trigger_method_name,
                   trigger_contract_address, trigger_parameter_to, trigger_parameter_value,
                   orig_query_json
            FROM tron_transactions WHERE hash = ?1
            "#,
            params![hash],
            record_from_row,
        )
        .optional()?;
    Ok(record)
}

/// Row counts per table: (transactions, period stats, category stats)
pub fn table_counts(store: &SqliteLedgerStore) -> Result<(i64, i64, i64), StoreError> {
    let conn = store.lock()?;
    let count = |table: &str| -> rusqlite::Result<i64> {
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
    };
    Ok((
        count("tron_transactions")?,
        count("tron_energy_stats")?,
        count("tron_contract_stats")?,
    ))
}
