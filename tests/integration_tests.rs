//! Integration tests for the grid trader
//!
//! These tests drive the controller, the stop-loss monitor and the replay
//! engine together against in-memory venues.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use grid_trader::backtest::{Backtester, KlineSeries};
use grid_trader::config::StrategyConfig;
use grid_trader::error::ExchangeResult;
use grid_trader::exchange::Exchange;
use grid_trader::grid::{
    generate_ladder, submit_ladder, BreachCheck, CycleOutcome, GridController, GridTrader,
    StopLossMonitor,
};
use grid_trader::{
    Balance, Config, ExchangeError, GridError, Kline, Order, OrderId, Side, TradingPair,
};

// =============================================================================
// Test Utilities
// =============================================================================

#[derive(Default)]
struct MockState {
    /// `None` makes price requests fail
    price: Option<Decimal>,
    open: Vec<Order>,
    next_id: u64,
    /// Limit prices whose placement is rejected
    reject_prices: HashSet<Decimal>,
    /// Orders whose cancel is rejected
    reject_cancels: HashSet<OrderId>,
    /// Open-order requests left to fail before the venue recovers
    open_orders_failures: u32,
    cancelled: Vec<OrderId>,
    market_sells: Vec<Decimal>,
    base_free: Decimal,
}

/// Scriptable venue that records every mutating call
#[derive(Default)]
struct MockExchange {
    state: Mutex<MockState>,
}

impl MockExchange {
    fn with_price(price: Decimal) -> Arc<Self> {
        let mock = Self::default();
        mock.set_price(Some(price));
        Arc::new(mock)
    }

    fn set_price(&self, price: Option<Decimal>) {
        self.state.lock().unwrap().price = price;
    }

    fn set_base_free(&self, free: Decimal) {
        self.state.lock().unwrap().base_free = free;
    }

    fn reject_price(&self, price: Decimal) {
        self.state.lock().unwrap().reject_prices.insert(price);
    }

    fn reject_cancel(&self, order_id: OrderId) {
        self.state.lock().unwrap().reject_cancels.insert(order_id);
    }

    fn fail_open_orders(&self, times: u32) {
        self.state.lock().unwrap().open_orders_failures = times;
    }

    fn fill_all(&self) {
        self.state.lock().unwrap().open.clear();
    }

    fn open_count(&self) -> usize {
        self.state.lock().unwrap().open.len()
    }

    fn open_ids(&self) -> Vec<OrderId> {
        self.state
            .lock()
            .unwrap()
            .open
            .iter()
            .map(|o| o.id.clone())
            .collect()
    }

    fn cancelled(&self) -> Vec<OrderId> {
        self.state.lock().unwrap().cancelled.clone()
    }

    fn market_sells(&self) -> Vec<Decimal> {
        self.state.lock().unwrap().market_sells.clone()
    }
}

#[async_trait]
impl Exchange for MockExchange {
    fn name(&self) -> &str {
        "mock"
    }

    async fn get_price(&self, _symbol: &str) -> ExchangeResult<Decimal> {
        self.state
            .lock()
            .unwrap()
            .price
            .ok_or_else(|| ExchangeError::Transient("price feed down".to_string()))
    }

    async fn get_balance(&self, asset: &str) -> ExchangeResult<Balance> {
        Ok(Balance {
            asset: asset.to_string(),
            free: self.state.lock().unwrap().base_free,
            locked: Decimal::ZERO,
        })
    }

    async fn get_open_orders(&self, symbol: &str) -> ExchangeResult<Vec<Order>> {
        let mut state = self.state.lock().unwrap();
        if state.open_orders_failures > 0 {
            state.open_orders_failures -= 1;
            return Err(ExchangeError::Transient("request timed out".to_string()));
        }
        Ok(state
            .open
            .iter()
            .filter(|o| o.symbol == symbol)
            .cloned()
            .collect())
    }

    async fn place_limit_order(
        &self,
        symbol: &str,
        side: Side,
        price: Decimal,
        quantity: Decimal,
    ) -> ExchangeResult<OrderId> {
        let mut state = self.state.lock().unwrap();
        if state.reject_prices.contains(&price) {
            return Err(ExchangeError::Rejected {
                code: -2010,
                message: "insufficient balance".to_string(),
            });
        }
        state.next_id += 1;
        let id = OrderId::new(format!("mock-{}", state.next_id));
        state.open.push(Order {
            id: id.clone(),
            symbol: symbol.to_string(),
            side,
            price,
            quantity,
        });
        Ok(id)
    }

    async fn place_market_order(
        &self,
        _symbol: &str,
        side: Side,
        quantity: Decimal,
    ) -> ExchangeResult<OrderId> {
        assert_eq!(side, Side::Sell);
        let mut state = self.state.lock().unwrap();
        state.market_sells.push(quantity);
        state.base_free -= quantity;
        state.next_id += 1;
        Ok(OrderId::new(format!("mock-{}", state.next_id)))
    }

    async fn cancel_order(&self, _symbol: &str, order_id: &OrderId) -> ExchangeResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.reject_cancels.contains(order_id) {
            return Err(ExchangeError::Rejected {
                code: -1021,
                message: "timestamp outside recvWindow".to_string(),
            });
        }
        let before = state.open.len();
        state.open.retain(|o| &o.id != order_id);
        if state.open.len() == before {
            return Err(ExchangeError::Rejected {
                code: -2011,
                message: "unknown order".to_string(),
            });
        }
        state.cancelled.push(order_id.clone());
        Ok(())
    }
}

/// Grid around 100: sells 102/103/104, buys 99/98/97, stop-loss 96
fn grid_config() -> StrategyConfig {
    StrategyConfig {
        pair: TradingPair::new("BTC", "USDT"),
        price_precision: 2,
        quantity_precision: 3,
        poll_interval_secs: 300,
        grid_size: dec!(0.01),
        grid_step: Decimal::ZERO,
        grid_count: 3,
        order_amount: dec!(1),
        amount_in_quote: false,
        stop_loss_update_secs: 7_200,
        max_retries: 3,
    }
}

fn exchange(mock: &Arc<MockExchange>) -> Arc<dyn Exchange> {
    mock.clone()
}

fn minutes(n: i64) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::minutes(n)
}

// =============================================================================
// Ladder Tests
// =============================================================================

#[test]
fn test_reference_ladder() {
    let ladder = generate_ladder(dec!(100), &grid_config()).unwrap();

    let sells: Vec<Decimal> = ladder.sells.iter().map(|l| l.price).collect();
    let buys: Vec<Decimal> = ladder.buys.iter().map(|l| l.price).collect();

    assert_eq!(sells, vec![dec!(102), dec!(103), dec!(104)]);
    assert_eq!(buys, vec![dec!(99), dec!(98), dec!(97)]);
    assert_eq!(ladder.stop_loss, dec!(96));
    assert!(ladder.levels().all(|l| l.quantity == dec!(1)));
}

#[test]
fn test_ladder_rejects_bad_inputs() {
    let config = grid_config();
    assert!(matches!(
        generate_ladder(Decimal::ZERO, &config),
        Err(GridError::InvalidParameter { .. })
    ));

    let zero_size = StrategyConfig {
        grid_size: Decimal::ZERO,
        ..grid_config()
    };
    assert!(generate_ladder(dec!(100), &zero_size).is_err());
}

// =============================================================================
// Controller Tests
// =============================================================================

#[tokio::test]
async fn test_first_cycle_places_full_ladder() {
    let mock = MockExchange::with_price(dec!(100));
    let mut controller = GridController::new(exchange(&mock), grid_config());

    match controller.run_cycle().await {
        CycleOutcome::Placed(report) => {
            assert!(report.is_complete());
            assert_eq!(report.succeeded.len(), 6);
        }
        other => panic!("expected placement, got {:?}", other),
    }
    assert_eq!(mock.open_count(), 6);
    assert_eq!(controller.retries(), 0);
    assert_eq!(controller.last_ladder().unwrap().reference_price, dec!(100));
}

#[tokio::test]
async fn test_stale_ladder_is_cancelled_once() {
    let mock = MockExchange::with_price(dec!(100));
    let mut controller = GridController::new(exchange(&mock), grid_config());

    assert!(matches!(controller.run_cycle().await, CycleOutcome::Placed(_)));
    let placed = mock.open_ids();

    for expected in 1..=3 {
        assert_eq!(
            controller.run_cycle().await,
            CycleOutcome::Waiting { retries: expected }
        );
    }

    match controller.run_cycle().await {
        CycleOutcome::ForceClosed(report) => {
            assert!(report.is_complete());
            assert_eq!(report.succeeded.len(), placed.len());
        }
        other => panic!("expected force close, got {:?}", other),
    }
    assert_eq!(controller.retries(), 0);
    assert_eq!(mock.open_count(), 0);

    let mut cancelled = mock.cancelled();
    cancelled.sort_by(|a, b| a.0.cmp(&b.0));
    let mut expected = placed;
    expected.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(cancelled, expected);

    // Nothing open anymore: the next cycle starts a fresh ladder
    assert!(matches!(controller.run_cycle().await, CycleOutcome::Placed(_)));
}

#[tokio::test]
async fn test_force_close_continues_past_failed_cancel() {
    let mock = MockExchange::with_price(dec!(100));
    let mut controller = GridController::new(exchange(&mock), grid_config());

    controller.run_cycle().await;
    let placed = mock.open_ids();
    let stuck = placed[2].clone();
    mock.reject_cancel(stuck.clone());

    for _ in 0..3 {
        controller.run_cycle().await;
    }

    match controller.run_cycle().await {
        CycleOutcome::ForceClosed(report) => {
            assert_eq!(report.succeeded.len(), 5);
            assert_eq!(report.failed.len(), 1);
            assert_eq!(
                report.into_result("cancels"),
                Err(GridError::PartialExecution {
                    action: "cancels",
                    failed: 1,
                    total: 6,
                })
            );
        }
        other => panic!("expected force close, got {:?}", other),
    }
    assert_eq!(controller.retries(), 0);
    assert_eq!(mock.cancelled().len(), 5);
    assert!(!mock.cancelled().contains(&stuck));
    assert_eq!(mock.open_ids(), vec![stuck]);

    // The leftover order starts a fresh retry count
    assert_eq!(
        controller.run_cycle().await,
        CycleOutcome::Waiting { retries: 1 }
    );
}

#[tokio::test]
async fn test_zero_retries_cancels_on_first_check() {
    let mock = MockExchange::with_price(dec!(100));
    let config = StrategyConfig {
        max_retries: 0,
        ..grid_config()
    };
    let mut controller = GridController::new(exchange(&mock), config);

    controller.run_cycle().await;
    assert!(matches!(
        controller.run_cycle().await,
        CycleOutcome::ForceClosed(_)
    ));
}

#[tokio::test]
async fn test_fill_resets_retry_counter() {
    let mock = MockExchange::with_price(dec!(100));
    let mut controller = GridController::new(exchange(&mock), grid_config());

    controller.run_cycle().await;
    assert_eq!(
        controller.run_cycle().await,
        CycleOutcome::Waiting { retries: 1 }
    );

    mock.fill_all();
    mock.set_price(Some(dec!(110)));

    assert!(matches!(controller.run_cycle().await, CycleOutcome::Placed(_)));
    assert_eq!(controller.retries(), 0);
    assert_eq!(controller.last_ladder().unwrap().reference_price, dec!(110));
    assert!(mock.cancelled().is_empty());
}

#[tokio::test]
async fn test_price_failure_skips_cycle() {
    let mock = MockExchange::with_price(dec!(100));
    let mut controller = GridController::new(exchange(&mock), grid_config());

    controller.run_cycle().await;
    controller.run_cycle().await;
    assert_eq!(controller.retries(), 1);

    mock.set_price(None);
    assert_eq!(controller.run_cycle().await, CycleOutcome::Skipped);
    assert_eq!(controller.retries(), 1);
    assert_eq!(mock.open_count(), 6);
}

#[tokio::test]
async fn test_partial_ladder_placement() {
    let mock = MockExchange::with_price(dec!(100));
    mock.reject_price(dec!(98));
    let ladder = generate_ladder(dec!(100), &grid_config()).unwrap();

    let report = submit_ladder(mock.as_ref(), "BTCUSDT", &ladder).await;

    assert_eq!(report.succeeded.len(), 5);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(mock.open_count(), 5);
    assert_eq!(
        report.into_result("placements"),
        Err(GridError::PartialExecution {
            action: "placements",
            failed: 1,
            total: 6,
        })
    );
}

// =============================================================================
// Stop-Loss Tests
// =============================================================================

#[tokio::test]
async fn test_stop_loss_fires_once_per_crossing() {
    let mock = MockExchange::with_price(dec!(100));
    mock.set_base_free(dec!(2.5));
    let monitor = StopLossMonitor::new(exchange(&mock), grid_config());

    // No threshold yet; the first evaluation arms the monitor
    assert_eq!(monitor.evaluate().await.unwrap(), BreachCheck::Unarmed);
    assert_eq!(monitor.state().threshold(), Some(dec!(96)));

    GridController::new(exchange(&mock), grid_config())
        .run_cycle()
        .await;
    assert_eq!(mock.open_count(), 6);

    assert_eq!(monitor.check_observed(dec!(98)).await, BreachCheck::Clear);
    assert_eq!(monitor.check_observed(dec!(95)).await, BreachCheck::Breach);
    assert_eq!(mock.open_count(), 0);
    assert_eq!(mock.cancelled().len(), 6);
    assert_eq!(mock.market_sells(), vec![dec!(2.5)]);

    assert_eq!(monitor.check_observed(dec!(94)).await, BreachCheck::Latched);
    assert_eq!(mock.market_sells().len(), 1);

    mock.set_base_free(dec!(1));
    assert_eq!(monitor.check_observed(dec!(97)).await, BreachCheck::Clear);
    assert_eq!(monitor.check_observed(dec!(93)).await, BreachCheck::Breach);
    assert_eq!(mock.market_sells(), vec![dec!(2.5), dec!(1)]);
}

#[tokio::test]
async fn test_failed_liquidation_retries_on_next_check() {
    let mock = MockExchange::with_price(dec!(100));
    mock.set_base_free(dec!(2));
    let monitor = StopLossMonitor::new(exchange(&mock), grid_config());
    monitor.evaluate().await.unwrap();

    // Venue times out right at the crash
    mock.fail_open_orders(1);
    assert_eq!(monitor.check_observed(dec!(95)).await, BreachCheck::Breach);
    assert!(mock.market_sells().is_empty());
    assert!(!monitor.state().is_latched());

    assert_eq!(monitor.check_observed(dec!(94)).await, BreachCheck::Breach);
    assert_eq!(mock.market_sells(), vec![dec!(2)]);
    assert!(monitor.state().is_latched());

    assert_eq!(monitor.check_observed(dec!(90)).await, BreachCheck::Latched);
    assert_eq!(mock.market_sells().len(), 1);
}

#[tokio::test]
async fn test_liquidation_without_balance_skips_sell() {
    let mock = MockExchange::with_price(dec!(100));
    let monitor = StopLossMonitor::new(exchange(&mock), grid_config());

    let liquidation = monitor.liquidate().await.unwrap();

    assert!(liquidation.sell.is_none());
    assert_eq!(liquidation.cancels.total(), 0);
    assert!(mock.market_sells().is_empty());
}

#[tokio::test]
async fn test_evaluate_failure_keeps_state() {
    let mock = MockExchange::with_price(dec!(100));
    let monitor = StopLossMonitor::new(exchange(&mock), grid_config());
    monitor.evaluate().await.unwrap();

    mock.set_price(None);
    assert!(monitor.evaluate().await.is_err());
    assert_eq!(monitor.state().threshold(), Some(dec!(96)));
    assert!(!monitor.state().is_latched());
}

// =============================================================================
// Live Runtime Tests
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_trader_forwards_poll_prices_to_stop_loss() {
    let mock = MockExchange::with_price(dec!(100));
    mock.set_base_free(dec!(1));

    let trader = GridTrader::spawn(exchange(&mock), grid_config()).unwrap();
    let stop_loss = trader.stop_loss();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(mock.open_count(), 6);
    assert_eq!(stop_loss.threshold(), Some(dec!(96)));

    // Next poll sees the crash long before the scheduled stop-loss update
    mock.set_price(Some(dec!(90)));
    tokio::time::sleep(Duration::from_secs(300)).await;

    assert!(stop_loss.is_latched());
    assert_eq!(mock.market_sells(), vec![dec!(1)]);

    trader.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_trader_shutdown_stops_polling() {
    let mock = MockExchange::with_price(dec!(100));
    let trader = GridTrader::spawn(exchange(&mock), grid_config()).unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;
    trader.shutdown().await.unwrap();

    mock.fill_all();
    tokio::time::sleep(Duration::from_secs(3_600)).await;
    assert_eq!(mock.open_count(), 0);
}

#[test]
fn test_trader_rejects_invalid_config() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let _guard = runtime.enter();

    let mock = MockExchange::with_price(dec!(100));
    let config = StrategyConfig {
        order_amount: Decimal::ZERO,
        ..grid_config()
    };
    assert!(GridTrader::spawn(exchange(&mock), config).is_err());
}

// =============================================================================
// Config Tests
// =============================================================================

#[test]
fn test_config_file_with_malformed_pair_fails() {
    let path = std::env::temp_dir().join(format!("grid_bad_pair_{}.json", std::process::id()));
    std::fs::write(&path, r#"{ "strategy": { "pair": "BTC-USDT" } }"#).unwrap();

    let result = Config::from_file(&path);
    std::fs::remove_file(&path).ok();

    assert!(result.is_err());
}

#[test]
fn test_sample_config_is_valid() {
    let config = Config::from_file("configs/btc_usdt_grid.json").unwrap();
    assert_eq!(config.strategy.symbol(), "BTCUSDT");
    assert!(config.exchange.testnet);
}

// =============================================================================
// Backtest Tests
// =============================================================================

#[test]
fn test_cursor_yields_each_kline_once() {
    let series = KlineSeries::new(
        (0..3)
            .map(|i| Kline::flat(minutes(i * 5), dec!(100)))
            .collect(),
    )
    .unwrap();

    let mut cursor = series.cursor();
    let mut seen = 0;
    while cursor.advance().is_some() {
        seen += 1;
    }
    assert_eq!(seen, 3);
    assert!(cursor.is_finished());
    assert!(cursor.advance().is_none());
    assert!(cursor.advance().is_none());
}

#[test]
fn test_series_rejects_unordered_klines() {
    let klines = vec![
        Kline::flat(minutes(5), dec!(100)),
        Kline::flat(minutes(0), dec!(100)),
    ];
    assert!(KlineSeries::new(klines).is_err());
}

#[tokio::test]
async fn test_backtest_oscillation_fills_both_sides() {
    let klines = vec![
        Kline::flat(minutes(0), dec!(100)),
        Kline::new(
            minutes(5),
            dec!(100),
            dec!(102.5),
            dec!(98.5),
            dec!(100),
            dec!(10),
        )
        .unwrap(),
    ];
    let series = KlineSeries::new(klines).unwrap();

    let report = Backtester::new(grid_config(), dec!(10))
        .run(&series)
        .await
        .unwrap();

    assert_eq!(report.klines, 2);
    assert_eq!(report.cycles, 2);
    assert_eq!(report.ladders_placed, 1);
    assert_eq!(report.orders_placed, 6);
    assert_eq!(report.fills, 2);
    assert_eq!(report.stop_loss_triggers, 0);
    assert_eq!(report.final_quantity, dec!(10));
}

#[tokio::test]
async fn test_backtest_crash_triggers_liquidation() {
    let klines = vec![
        Kline::flat(minutes(0), dec!(100)),
        Kline::flat(minutes(5), dec!(100)),
        Kline::flat(minutes(10), dec!(90)),
    ];
    let series = KlineSeries::new(klines).unwrap();

    let report = Backtester::new(grid_config(), Decimal::ZERO)
        .run(&series)
        .await
        .unwrap();

    // All three buys fill on the way down, then the stop-loss sells them
    assert_eq!(report.fills, 3);
    assert_eq!(report.stop_loss_triggers, 1);
    assert_eq!(report.final_quantity, Decimal::ZERO);
    assert_eq!(report.last_price, Some(dec!(90)));
}
