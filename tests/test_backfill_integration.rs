//! End-to-end backfill tests against a mock Tronscan server
//!
//! Each test runs the real `TronscanClient` against wiremock and a real
//! on-disk SQLite store in a temp directory. The binary tests at the bottom
//! exercise exit codes.

#[cfg(test)]
mod backfill_integration_tests {
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};
    use tempfile::TempDir;
    use tronflow::fetch::RetryPolicy;
    use tronflow::pipeline::db::{find_transaction, table_counts};
    use tronflow::pipeline::types::{CostBreakdown, TriggerInfo, TxStatus};
    use tronflow::pipeline::{
        BackfillEngine, BackfillOptions, Granularity, LedgerStore, Lookback, SqliteLedgerStore,
        TransactionRecord,
    };
    use tronflow::{now_millis, BackfillConfig, TronscanClient};
    use wiremock::{
        matchers::{method, path, query_param},
        Mock, MockServer, Request, ResponseTemplate,
    };

    const WALLET: &str = "TRaH4GZtNiTXfooiufvYyVhAY7fuhUrs2v";
    const DAY_MS: i64 = 24 * 60 * 60 * 1000;

    struct Harness {
        _dir: TempDir,
        config: BackfillConfig,
        store: Arc<SqliteLedgerStore>,
        client: Arc<TronscanClient>,
    }

    impl Harness {
        fn new(server: &MockServer) -> Self {
            let dir = TempDir::new().unwrap();
            let db_path = dir.path().join("tron_data.db");

            let mut config = BackfillConfig::new(WALLET, db_path.to_string_lossy());
            config.api_base_url = format!("{}/api", server.uri());
            config.page_delay_ms = 0;
            config.request_timeout_secs = 5;
            config.retry = RetryPolicy::new(3, Duration::from_millis(5), Duration::from_millis(20));

            let store = Arc::new(SqliteLedgerStore::open(&config.db_path, WALLET).unwrap());
            let client = Arc::new(TronscanClient::new(&config).unwrap());

            Self {
                _dir: dir,
                config,
                store,
                client,
            }
        }

        fn engine(&self, resume_from_latest: bool) -> BackfillEngine {
            let mut options = BackfillOptions::from_config(&self.config);
            options.resume_from_latest = resume_from_latest;
            BackfillEngine::new(self.client.clone(), self.store.clone(), WALLET, options)
        }
    }

    fn raw_tx(hash: &str, timestamp: i64) -> Value {
        json!({
            "hash": hash,
            "timestamp": timestamp,
            "block": 60_000_000,
            "contractType": 31,
            "contractRet": "SUCCESS",
            "amount": "0",
            "cost": {
                "fee": 2_000_000,
                "net_fee": 345_000,
                "energy_fee": 1_655_000,
                "energy_usage_total": 31_895,
                "net_usage": 345
            },
            "trigger_info": {
                "method": "transfer(address,uint256)",
                "methodId": "a9059cbb",
                "contract_address": "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t",
                "parameter": { "_to": "TXYZopYRdj2D9XRtbG411XZZ3kM5VkAeBf", "_value": "1000000" }
            }
        })
    }

    fn page(records: Vec<Value>, total: usize) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({ "data": records, "total": total }))
    }

    fn query_value(request: &Request, key: &str) -> Option<i64> {
        request
            .url
            .query_pairs()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| v.parse().ok())
    }

    #[tokio::test]
    async fn test_empty_upstream_writes_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/transaction"))
            .respond_with(page(vec![], 0))
            .mount(&server)
            .await;
        let harness = Harness::new(&server);
        let engine = harness.engine(true);

        let report = engine.run(Lookback::Days(1)).await.unwrap();
        let stats = engine
            .refresh_statistics(&report.batch, Granularity::Hour)
            .unwrap();

        assert_eq!(report.processed(), 0);
        assert!(report.is_complete());
        assert_eq!(stats.periods, 0);
        assert_eq!(table_counts(&harness.store).unwrap(), (0, 0, 0));
    }

    #[tokio::test]
    async fn test_two_pages_store_sixty_transactions() {
        let server = MockServer::start().await;
        let now = now_millis();
        let records: Vec<Value> = (0..60)
            .map(|i| raw_tx(&format!("{:064x}", i + 1), now - 60_000 * (i + 1)))
            .collect();

        Mock::given(method("GET"))
            .and(path("/api/transaction"))
            .and(query_param("start", "0"))
            .and(query_param("limit", "50"))
            .respond_with(page(records[..50].to_vec(), 60))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/transaction"))
            .and(query_param("start", "50"))
            .respond_with(page(records[50..].to_vec(), 60))
            .expect(1)
            .mount(&server)
            .await;

        let harness = Harness::new(&server);
        let engine = harness.engine(true);
        let report = engine.run(Lookback::Days(1)).await.unwrap();

        assert_eq!(report.pages_fetched, 2);
        assert_eq!(report.processed(), 60);
        assert_eq!(report.stored.success, 60);
        assert_eq!(report.stored.errors, 0);
        assert_eq!(table_counts(&harness.store).unwrap().0, 60);

        let stats = engine
            .refresh_statistics(&report.batch, Granularity::Day)
            .unwrap();
        assert_eq!(stats.total_transactions, 60);
        assert_eq!(stats.total_energy_usage_total, 60.0 * 31_895.0);
    }

    #[tokio::test]
    async fn test_record_without_cost_or_trigger() {
        let server = MockServer::start().await;
        let now = now_millis();
        let bare = json!({
            "hash": "bare_trx_transfer",
            "timestamp": now - 5_000,
            "block": 60_000_001,
            "contractType": 1,
            "contractRet": "SUCCESS",
            "amount": 1_000_000
        });
        Mock::given(method("GET"))
            .and(path("/api/transaction"))
            .respond_with(page(vec![bare], 1))
            .mount(&server)
            .await;

        let harness = Harness::new(&server);
        let report = harness.engine(true).run(Lookback::Hours(1)).await.unwrap();
        assert_eq!(report.stored.success, 1);

        let stored = find_transaction(&harness.store, "bare_trx_transfer")
            .unwrap()
            .unwrap();
        assert_eq!(stored.cost, CostBreakdown::default());
        assert_eq!(stored.trigger, TriggerInfo::default());
        assert_eq!(stored.amount, 1_000_000.0);
        assert_eq!(stored.status, TxStatus::Success);
    }

    #[tokio::test]
    async fn test_covered_window_gets_no_requests() {
        let server = MockServer::start().await;
        let now = now_millis();
        let covered_ts = now - 10 * DAY_MS;
        let fresh = raw_tx("fresh_tx", now - 60_000);

        Mock::given(method("GET"))
            .and(path("/api/transaction"))
            .respond_with(page(vec![fresh], 1))
            .mount(&server)
            .await;

        let harness = Harness::new(&server);
        let existing = TransactionRecord {
            hash: "from_an_earlier_run".to_string(),
            wallet: WALLET.to_string(),
            timestamp: covered_ts,
            block: 59_000_000,
            contract_type: 1,
            status: TxStatus::Success,
            amount: 5.0,
            cost: CostBreakdown::default(),
            trigger: TriggerInfo::default(),
            orig_query_json: "{}".to_string(),
        };
        assert_eq!(harness.store.upsert_transactions(&[existing]).success, 1);

        let report = harness.engine(false).run(Lookback::Days(14)).await.unwrap();

        assert_eq!(report.windows_skipped, 1);
        assert_eq!(report.windows_fetched, 1);

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        let start = query_value(&requests[0], "start_timestamp").unwrap();
        let end = query_value(&requests[0], "end_timestamp").unwrap();
        assert!(start > covered_ts, "covered range was requested");
        assert!(end >= now);
        assert_eq!(table_counts(&harness.store).unwrap().0, 2);
    }

    #[tokio::test]
    async fn test_forbidden_then_ok_backs_off_and_stores() {
        let server = MockServer::start().await;
        let now = now_millis();
        let record = raw_tx("after_throttle", now - 30_000);
        let times: Mutex<u64> = Mutex::new(0);

        Mock::given(method("GET"))
            .and(path("/api/transaction"))
            .respond_with(move |_: &Request| {
                let mut times = times.lock().unwrap();
                *times += 1;
                match *times {
                    1 => ResponseTemplate::new(403),
                    _ => page(vec![record.clone()], 1),
                }
            })
            .mount(&server)
            .await;

        let harness = Harness::new(&server);
        let (throttle_min, _) = harness.config.retry.throttle_delay_range();

        let started = Instant::now();
        let report = harness.engine(true).run(Lookback::Hours(1)).await.unwrap();

        assert!(started.elapsed() >= throttle_min);
        assert!(report.is_complete());
        assert_eq!(report.stored.success, 1);
        assert!(find_transaction(&harness.store, "after_throttle")
            .unwrap()
            .is_some());
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_rerun_resumes_and_skips_known_history() {
        let server = MockServer::start().await;
        let now = now_millis();
        let record = raw_tx("only_once", now - 120_000);

        Mock::given(method("GET"))
            .and(path("/api/transaction"))
            .respond_with(page(vec![record], 1))
            .mount(&server)
            .await;

        let harness = Harness::new(&server);
        harness.engine(true).run(Lookback::Days(1)).await.unwrap();

        let second = harness.engine(true).run(Lookback::Days(1)).await.unwrap();
        let interval = second.interval.unwrap();
        assert!(interval.start > now - 120_000);

        // Mock ignores the window, so the same record comes back and is upserted in place
        assert_eq!(table_counts(&harness.store).unwrap().0, 1);
        assert!(harness.store.latest_timestamp().unwrap().is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_binary_exits_zero_without_data() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/transaction"))
            .respond_with(page(vec![], 0))
            .mount(&server)
            .await;
        let dir = TempDir::new().unwrap();

        let output = tokio::process::Command::new(env!("CARGO_BIN_EXE_tronflow-backfill"))
            .args(["--hours", "2", "--period", "day"])
            .env("TRON_WALLET_ADDRESS", WALLET)
            .env("SQLITE_DB_PATH", dir.path().join("run.db"))
            .env("TRONSCAN_API_URL", format!("{}/api", server.uri()))
            .env("BACKFILL_PAGE_DELAY_MS", "0")
            .env_remove("TRON_PROXY_URL")
            .env_remove("HTTPS_PROXY")
            .output()
            .await
            .unwrap();

        assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
        assert!(!server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_binary_exits_one_when_store_cannot_open() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();

        // A directory is not a database file
        let output = tokio::process::Command::new(env!("CARGO_BIN_EXE_tronflow-backfill"))
            .env("TRON_WALLET_ADDRESS", WALLET)
            .env("SQLITE_DB_PATH", dir.path())
            .env("TRONSCAN_API_URL", format!("{}/api", server.uri()))
            .env_remove("TRON_PROXY_URL")
            .env_remove("HTTPS_PROXY")
            .output()
            .await
            .unwrap();

        assert_eq!(output.status.code(), Some(1));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_binary_rejects_hours_with_days() {
        let output = tokio::process::Command::new(env!("CARGO_BIN_EXE_tronflow-backfill"))
            .args(["--hours", "1", "--days", "1"])
            .env("TRON_WALLET_ADDRESS", WALLET)
            .output()
            .await
            .unwrap();

        assert!(!output.status.success());
    }
}
