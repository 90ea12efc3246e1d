//! Backfill runtime - fetch recent account history and refresh statistics
//!
//! Usage:
//!   tronflow-backfill [--hours N | --days N] [--period hour|day|month] [--currency-rates]
//!
//! Environment variables (see `BackfillConfig::from_env`):
//!   TRON_WALLET_ADDRESS - account to backfill (required)
//!   SQLITE_DB_PATH - SQLite database path (default: tron_data.db)
//!   TRON_PROXY_URL / HTTPS_PROXY - outbound proxy (default: none)
//!
//! Exit codes: 0 on success (including "nothing new"), 1 when configuration
//! or storage fails.

use clap::{ArgGroup, Parser};
use dotenv::dotenv;
use log::{error, info, warn};
use std::process::ExitCode;
use std::sync::Arc;
use tronflow::pipeline::{
    BackfillEngine, BackfillOptions, Granularity, LedgerStore, Lookback, SqliteLedgerStore,
};
use tronflow::rates::snapshot_currency_rates;
use tronflow::{now_millis, BackfillConfig, TronscanClient};

#[derive(Parser, Debug)]
#[command(
    name = "tronflow-backfill",
    version,
    about = "Backfill Tron account transactions into SQLite and refresh energy statistics"
)]
#[command(group(ArgGroup::new("lookback").args(["hours", "days"])))]
struct Cli {
    /// Look back this many hours
    #[arg(long)]
    hours: Option<u32>,

    /// Look back this many days (default: 1)
    #[arg(long)]
    days: Option<u32>,

    /// Statistics bucket granularity
    #[arg(long, value_enum, default_value_t = Granularity::Hour)]
    period: Granularity,

    /// Also snapshot current token prices
    #[arg(long)]
    currency_rates: bool,

    /// Ignore stored history when planning and sweep the full lookback
    #[arg(long)]
    no_resume: bool,
}

impl Cli {
    fn lookback(&self) -> Lookback {
        match (self.hours, self.days) {
            (Some(hours), _) => Lookback::Hours(hours),
            (_, Some(days)) => Lookback::Days(days),
            _ => Lookback::default(),
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();

    let config = match BackfillConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("❌ Configuration error: {}", e);
            return ExitCode::from(1);
        }
    };

    let lookback = cli.lookback();
    info!("🚀 Tron backfill starting");
    info!("   ├─ Wallet: {}", config.wallet_address);
    info!("   ├─ Database: {}", config.db_path);
    info!("   ├─ API: {}", config.api_base_url);
    info!("   ├─ Proxy: {}", if config.proxy_url.is_some() { "enabled" } else { "none" });
    info!("   ├─ Lookback: {}", lookback.describe());
    info!("   ├─ Period: {}", cli.period.as_str());
    info!("   ├─ Window: {} day(s), page size {}", config.window_days, config.page_size);
    info!("   └─ Coverage: {}", config.coverage_mode.as_str());

    info!("🔧 Initializing database...");
    let store = match SqliteLedgerStore::open(&config.db_path, config.wallet_address.clone()) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("❌ Failed to initialize database {}: {}", config.db_path, e);
            return ExitCode::from(1);
        }
    };
    info!("✅ Database initialized");

    let client = match TronscanClient::new(&config) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("❌ Failed to build HTTP client: {}", e);
            return ExitCode::from(1);
        }
    };

    // Independent of the backfill outcome
    if cli.currency_rates {
        let store: &dyn LedgerStore = store.as_ref();
        match snapshot_currency_rates(&client, store, now_millis()).await {
            Ok(written) => info!("✅ Stored {} currency rates", written),
            Err(e) => warn!("⚠️  Currency rate snapshot failed: {}", e),
        }
    }

    let mut options = BackfillOptions::from_config(&config);
    options.resume_from_latest = !cli.no_resume;

    let engine = BackfillEngine::new(
        client.clone(),
        store.clone(),
        config.wallet_address.clone(),
        options,
    );

    let report = match engine.run(lookback).await {
        Ok(report) => report,
        Err(e) => {
            error!("❌ Backfill aborted: {}", e);
            return ExitCode::from(1);
        }
    };

    if !report.is_complete() {
        warn!(
            "⚠️  {} window(s) could not be fetched completely; \
             they will be retried on the next run",
            report.windows_unavailable
        );
    }

    let stats = match engine.refresh_statistics(&report.batch, cli.period) {
        Ok(stats) => stats,
        Err(e) => {
            error!("❌ Failed to write statistics: {}", e);
            return ExitCode::from(1);
        }
    };

    info!("📊 Summary");
    info!(
        "   ├─ Windows: {} planned, {} skipped, {} fetched ({} empty), {} unavailable",
        report.windows_planned,
        report.windows_skipped,
        report.windows_fetched,
        report.windows_empty,
        report.windows_unavailable
    );
    info!("   ├─ Pages fetched: {}", report.pages_fetched);
    info!("   ├─ Transactions in refreshed periods: {}", stats.total_transactions);
    info!("   ├─ Energy usage total: {:.0}", stats.total_energy_usage_total);
    info!("   ├─ Energy fee: {:.0}", stats.total_energy_fee);
    info!(
        "   └─ Processed: {} | Stored: {} | Failed: {}",
        report.processed(),
        report.stored.success,
        report.stored.errors
    );

    ExitCode::SUCCESS
}
