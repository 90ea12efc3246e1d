//! Period and category statistics
//!
//! Statistics are always recomputed from a full set of transactions and then
//! written as a full replace per key. BTreeMap keeps the output ordered by
//! key so the same input always produces the same output.

use super::types::{CategoryStat, Granularity, PeriodStat, TransactionRecord};
use log::warn;
use std::collections::BTreeMap;

/// Fold transactions into per-period and per-(period, category) statistics
pub fn generate_statistics(
    records: &[TransactionRecord],
    granularity: Granularity,
    wallet: &str,
) -> (Vec<PeriodStat>, Vec<CategoryStat>) {
    let mut periods: BTreeMap<String, PeriodStat> = BTreeMap::new();
    let mut categories: BTreeMap<(String, i64), CategoryStat> = BTreeMap::new();

    for tx in records {
        let Some(key) = granularity.period_key(tx.timestamp) else {
            warn!(
                "⚠️  Skipping {} in statistics: timestamp {} is out of range",
                tx.hash,
                tx.timestamp
            );
            continue;
        };

        let period = periods
            .entry(key.clone())
            .or_insert_with(|| PeriodStat::new(key.clone(), wallet.to_string(), tx.timestamp));

        period.start_timestamp = period.start_timestamp.min(tx.timestamp);
        period.end_timestamp = period.end_timestamp.max(tx.timestamp);
        period.total_transactions += 1;
        if tx.status.is_success() {
            period.successful_transactions += 1;
        } else {
            period.failed_transactions += 1;
        }
        period.total_fee += tx.cost.fee;
        period.total_net_fee += tx.cost.net_fee;
        period.total_energy_fee += tx.cost.energy_fee;
        period.total_energy_usage += tx.cost.energy_usage;
        period.total_energy_usage_total += tx.cost.energy_usage_total;
        period.total_energy_penalty += tx.cost.energy_penalty_total;
        period.total_net_usage += tx.cost.net_usage;

        let category = categories
            .entry((key.clone(), tx.contract_type))
            .or_insert_with(|| CategoryStat {
                time_period: key,
                wallet: wallet.to_string(),
                contract_type: tx.contract_type,
                transaction_count: 0,
                total_fee: 0.0,
                total_energy_fee: 0.0,
                total_energy_usage: 0.0,
            });

        category.transaction_count += 1;
        category.total_fee += tx.cost.fee;
        category.total_energy_fee += tx.cost.energy_fee;
        category.total_energy_usage += tx.cost.energy_usage;
    }

    (
        periods.into_values().collect(),
        categories.into_values().collect(),
    )
}

/// Buckets a batch touches, with each bucket's inclusive calendar bounds
///
/// Records whose timestamp has no calendar bucket are left out.
pub fn touched_buckets(
    records: &[TransactionRecord],
    granularity: Granularity,
) -> BTreeMap<String, (i64, i64)> {
    records
        .iter()
        .filter_map(|tx| {
            let key = granularity.period_key(tx.timestamp)?;
            let bounds = granularity.bucket_bounds(tx.timestamp)?;
            Some((key, bounds))
        })
        .collect()
}

/// Totals across written period statistics, for the run summary
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatisticsSummary {
    pub periods: usize,
    pub categories: usize,
    pub total_transactions: i64,
    pub total_energy_usage_total: f64,
    pub total_energy_fee: f64,
}

pub fn summarize(periods: &[PeriodStat], categories: &[CategoryStat]) -> StatisticsSummary {
    StatisticsSummary {
        periods: periods.len(),
        categories: categories.len(),
        total_transactions: periods.iter().map(|p| p.total_transactions).sum(),
        total_energy_usage_total: periods.iter().map(|p| p.total_energy_usage_total).sum(),
        total_energy_fee: periods.iter().map(|p| p.total_energy_fee).sum(),
    }
}
