//! End-to-end paper-trading flow: two simulated venues with a standing
//! price gap, detection through execution, trades recorded to the JSONL
//! repository.

use std::time::Duration;

use tokio::sync::watch;

use skimmer::app::App;
use skimmer::config::Config;

fn config_toml(repository_path: &str) -> String {
    format!(
        r#"
        [logging]
        level = "warn"
        format = "pretty"

        [arbitrage]
        pairs = ["BTC/USD"]
        auto_trade = true
        paper_trading = true
        poll_interval_ms = 50
        execution_window_secs = 5
        channel_capacity = 16

        [risk]
        min_profit_percent = 0.5
        max_trade_amount = 1000
        max_concurrent_trades = 1
        cooldown_secs = 0

        [[venues]]
        id = "alpha"
        kind = "sim"

        [venues.sim]
        start_price = 100
        step_percent = 0
        tick_ms = 50

        [[venues]]
        id = "beta"
        kind = "sim"

        [venues.sim]
        start_price = 103
        step_percent = 0
        tick_ms = 50

        [paper.balances]
        USD = 10000
        BTC = 5

        [repository]
        kind = "jsonl"
        path = "{repository_path}"
    "#
    )
}

#[tokio::test]
async fn paper_pipeline_records_trades_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let toml = config_toml(dir.path().to_str().unwrap());
    let config: Config = toml::from_str(&toml).unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let app = tokio::spawn(App::run_with_shutdown(config, shutdown_rx));

    // Alpha asks ~100.05, beta bids ~102.95: a standing ~2.9% spread that
    // clears fees. Wait for at least one recorded trade.
    let trades_file = dir.path().join("trades.jsonl");
    let mut recorded = String::new();
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        if let Ok(content) = std::fs::read_to_string(&trades_file) {
            if !content.trim().is_empty() {
                recorded = content;
                break;
            }
        }
    }
    assert!(!recorded.is_empty(), "no trade was recorded within 5s");

    let first: serde_json::Value = serde_json::from_str(recorded.lines().next().unwrap()).unwrap();
    assert_eq!(first["success"], serde_json::Value::Bool(true));
    assert_eq!(first["buy"]["venue"], "alpha");
    assert_eq!(first["sell"]["venue"], "beta");

    let _ = shutdown_tx.send(true);
    app.await.unwrap().unwrap();

    // Shutdown flushed statistics too.
    let stats = std::fs::read_to_string(dir.path().join("statistics.jsonl")).unwrap();
    let last: serde_json::Value = serde_json::from_str(stats.lines().last().unwrap()).unwrap();
    assert!(last["trades_executed"].as_u64().unwrap() >= 1);
}
