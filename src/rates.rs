//! Currency-rate snapshot from the Tronscan price endpoint
//!
//! ## API Reference
//!
//! Endpoint: `GET {base}/token/price`
//! Returns: `{ "data": [{ "symbol", "priceInUsd", "volume24h", "percentChange24h" }] }`
//!
//! One row per (UTC date, symbol); a later snapshot on the same day
//! overwrites the earlier one.

use crate::fetch::{FetchError, TronscanClient};
use crate::normalizer::{num_field, text_field};
use crate::pipeline::db::{LedgerStore, StoreError};
use crate::pipeline::types::{CurrencyRate, Granularity};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Price fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Price store failed: {0}")]
    Store(#[from] StoreError),
}

/// Map raw price entries to rows stamped with `now_ms`; entries without a symbol are dropped
pub fn parse_currency_rates(entries: &[Value], now_ms: i64) -> Vec<CurrencyRate> {
    let date = Granularity::Day.period_key(now_ms).unwrap_or_default();

    entries
        .iter()
        .filter_map(|entry| {
            let symbol = text_field(entry, "symbol");
            if symbol.is_empty() {
                return None;
            }
            Some(CurrencyRate {
                timestamp: now_ms,
                date: date.clone(),
                symbol,
                price_usdt: num_field(entry, "priceInUsd"),
                volume_24h: num_field(entry, "volume24h"),
                change_24h: num_field(entry, "percentChange24h"),
            })
        })
        .collect()
}

/// Fetch current prices and upsert them, returns rows written
pub async fn snapshot_currency_rates(
    client: &TronscanClient,
    store: &dyn LedgerStore,
    now_ms: i64,
) -> Result<usize, SnapshotError> {
    let entries = client.fetch_token_prices().await?;
    let rates = parse_currency_rates(&entries, now_ms);
    log::info!("💱 Received {} currency rates", rates.len());

    let written = store.upsert_currency_rates(&rates)?;
    Ok(written)
}
