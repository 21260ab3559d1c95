//! Binance spot REST client
//!
//! Implements the [`Exchange`] gateway and the [`HistoricalData`] capability:
//! - Rate limiting on every request
//! - Retry with exponential backoff for transient failures on idempotent calls
//! - HMAC-SHA256 signed account and order endpoints
//!
//! Order placement is never retried: a timeout does not tell us whether the
//! order reached the book.
//!
//! # Example
//! ```no_run
//! use grid_trader::binance::BinanceClient;
//! use grid_trader::config::ExchangeConfig;
//! use grid_trader::exchange::Exchange;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = BinanceClient::new(&ExchangeConfig::default())?;
//!     let price = client.get_price("BTCUSDT").await?;
//!     println!("BTCUSDT: {}", price);
//!     Ok(())
//! }
//! ```

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Method, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info};

use super::auth::Credentials;
use super::types::{
    kline_from_raw, side_param, AccountInfo, ApiError, OpenOrder, OrderAck, TickerPrice,
};
use crate::common::{RateLimiter, RetryPolicy};
use crate::config::ExchangeConfig;
use crate::error::{ExchangeError, ExchangeResult};
use crate::exchange::{Exchange, HistoricalData, TimeRange};
use crate::{Balance, Interval, Kline, Order, OrderId, Side};

/// Base URL for the production API
pub const MAINNET_BASE_URL: &str = "https://api.binance.com/api/v3";

/// Base URL for the spot test network
pub const TESTNET_BASE_URL: &str = "https://testnet.binance.vision/api/v3";

/// Maximum klines per request (Binance limit)
const MAX_KLINES_PER_REQUEST: u32 = 1000;

const VENUE: &str = "binance";

type Params = Vec<(&'static str, String)>;

/// Binance spot API client
#[derive(Debug, Clone)]
pub struct BinanceClient {
    http: Client,
    base_url: String,
    credentials: Option<Credentials>,
    rate_limiter: RateLimiter,
    retry: RetryPolicy,
    recv_window_ms: u64,
}

impl BinanceClient {
    /// Build a client from the exchange section of the config
    ///
    /// Credentials are optional; without them only public endpoints work.
    pub fn new(config: &ExchangeConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout())
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .context("Failed to build HTTP client")?;

        let credentials = match (&config.api_key, &config.api_secret) {
            (Some(key), Some(secret)) => Some(Credentials::new(key, secret)),
            _ => None,
        };

        let base_url = if config.testnet {
            TESTNET_BASE_URL
        } else {
            MAINNET_BASE_URL
        };

        Ok(Self {
            http,
            base_url: base_url.to_string(),
            credentials,
            rate_limiter: RateLimiter::per_second(config.rate_limit),
            retry: RetryPolicy::default().with_max_retries(config.max_retries),
            recv_window_ms: config.recv_window_ms,
        })
    }

    /// Point the client at another base URL (mock servers, regional endpoints)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    /// Send one request and map the HTTP outcome onto [`ExchangeError`]
    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        url: String,
        api_key: Option<&str>,
    ) -> ExchangeResult<T> {
        self.rate_limiter.acquire().await;

        let mut request = self.http.request(method, &url);
        if let Some(key) = api_key {
            request = request.header("X-MBX-APIKEY", key);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(map_status(status, &body));
        }

        serde_json::from_str(&body)
            .map_err(|e| ExchangeError::InvalidResponse(format!("{}: {}", e, truncate(&body))))
    }

    async fn public_get<T: DeserializeOwned>(&self, path: &str, params: &Params) -> ExchangeResult<T> {
        let url = format!("{}{}?{}", self.base_url, path, encode(params));
        self.retry
            .run(|| self.send(Method::GET, url.clone(), None))
            .await
    }

    async fn signed_once<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &Params,
    ) -> ExchangeResult<T> {
        let credentials = self.credentials.as_ref().ok_or_else(|| ExchangeError::Rejected {
            code: -2014,
            message: "API key and secret are required for signed endpoints".to_string(),
        })?;

        // Timestamp is taken per attempt so retries stay inside recvWindow
        let query = credentials.signed_query(
            &encode(params),
            Utc::now().timestamp_millis(),
            self.recv_window_ms,
        );
        let url = format!("{}{}?{}", self.base_url, path, query);
        self.send(method, url, Some(credentials.api_key())).await
    }

    async fn signed<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: Params,
        retry: bool,
    ) -> ExchangeResult<T> {
        if retry {
            self.retry
                .run(|| self.signed_once(method.clone(), path, &params))
                .await
        } else {
            self.signed_once(method, path, &params).await
        }
    }

    /// One page of klines
    pub async fn get_klines(
        &self,
        symbol: &str,
        interval: Interval,
        start_ms: Option<i64>,
        end_ms: Option<i64>,
        limit: Option<u32>,
    ) -> ExchangeResult<Vec<Kline>> {
        let limit = limit
            .unwrap_or(MAX_KLINES_PER_REQUEST)
            .min(MAX_KLINES_PER_REQUEST);

        let mut params: Params = vec![
            ("symbol", symbol.to_string()),
            ("interval", interval.as_str().to_string()),
        ];
        if let Some(start) = start_ms {
            params.push(("startTime", start.to_string()));
        }
        if let Some(end) = end_ms {
            params.push(("endTime", end.to_string()));
        }
        params.push(("limit", limit.to_string()));

        debug!(symbol, %interval, limit, "Fetching klines");

        let rows: Vec<Vec<serde_json::Value>> = self.public_get("/klines", &params).await?;
        let total = rows.len();
        let klines: Vec<Kline> = rows.iter().filter_map(|row| kline_from_raw(row)).collect();
        if klines.len() != total {
            return Err(ExchangeError::InvalidResponse(format!(
                "{} of {} kline rows could not be parsed",
                total - klines.len(),
                total
            )));
        }

        Ok(klines)
    }

    /// Check server connectivity
    pub async fn ping(&self) -> ExchangeResult<()> {
        let _: serde_json::Value = self.public_get("/ping", &Vec::new()).await?;
        Ok(())
    }
}

#[async_trait]
impl Exchange for BinanceClient {
    fn name(&self) -> &str {
        VENUE
    }

    async fn get_price(&self, symbol: &str) -> ExchangeResult<Decimal> {
        let ticker: TickerPrice = self
            .public_get("/ticker/price", &vec![("symbol", symbol.to_string())])
            .await?;
        Ok(ticker.price)
    }

    async fn get_balance(&self, asset: &str) -> ExchangeResult<Balance> {
        let account: AccountInfo = self.signed(Method::GET, "/account", Vec::new(), true).await?;
        let balance = account
            .balances
            .into_iter()
            .find(|b| b.asset.eq_ignore_ascii_case(asset))
            .map(Balance::from)
            .unwrap_or_else(|| Balance {
                asset: asset.to_uppercase(),
                free: Decimal::ZERO,
                locked: Decimal::ZERO,
            });
        Ok(balance)
    }

    async fn get_open_orders(&self, symbol: &str) -> ExchangeResult<Vec<Order>> {
        let orders: Vec<OpenOrder> = self
            .signed(
                Method::GET,
                "/openOrders",
                vec![("symbol", symbol.to_string())],
                true,
            )
            .await?;
        Ok(orders.into_iter().filter_map(OpenOrder::into_order).collect())
    }

    async fn place_limit_order(
        &self,
        symbol: &str,
        side: Side,
        price: Decimal,
        quantity: Decimal,
    ) -> ExchangeResult<OrderId> {
        let params = vec![
            ("symbol", symbol.to_string()),
            ("side", side_param(side).to_string()),
            ("type", "LIMIT".to_string()),
            ("timeInForce", "GTC".to_string()),
            ("quantity", quantity.normalize().to_string()),
            ("price", price.normalize().to_string()),
        ];
        let ack: OrderAck = self.signed(Method::POST, "/order", params, false).await?;
        Ok(OrderId::new(ack.order_id.to_string()))
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        side: Side,
        quantity: Decimal,
    ) -> ExchangeResult<OrderId> {
        let params = vec![
            ("symbol", symbol.to_string()),
            ("side", side_param(side).to_string()),
            ("type", "MARKET".to_string()),
            ("quantity", quantity.normalize().to_string()),
        ];
        let ack: OrderAck = self.signed(Method::POST, "/order", params, false).await?;
        info!(symbol, %side, %quantity, order_id = ack.order_id, "Market order placed");
        Ok(OrderId::new(ack.order_id.to_string()))
    }

    async fn cancel_order(&self, symbol: &str, order_id: &OrderId) -> ExchangeResult<()> {
        let params = vec![
            ("symbol", symbol.to_string()),
            ("orderId", order_id.to_string()),
        ];
        let _: serde_json::Value = self.signed(Method::DELETE, "/order", params, true).await?;
        Ok(())
    }

    fn historical(&self) -> Option<&dyn HistoricalData> {
        Some(self)
    }
}

#[async_trait]
impl HistoricalData for BinanceClient {
    /// Paginate `/klines` from `range.start` until `range.end` (or now)
    async fn get_historical_klines(
        &self,
        symbol: &str,
        interval: Interval,
        range: TimeRange,
    ) -> ExchangeResult<Vec<Kline>> {
        let end_ms = range
            .end
            .unwrap_or_else(Utc::now)
            .timestamp_millis();
        let mut current_start = range.start.timestamp_millis();
        let mut all_klines: Vec<Kline> = Vec::new();

        info!(symbol, %interval, start = %range.start, end = ?range.end, "Fetching kline history");

        while current_start < end_ms {
            let klines = self
                .get_klines(
                    symbol,
                    interval,
                    Some(current_start),
                    Some(end_ms - 1),
                    Some(MAX_KLINES_PER_REQUEST),
                )
                .await?;

            let Some(last) = klines.last() else {
                break;
            };
            // Next page starts at the candle after the last one returned
            current_start = (last.open_time + interval.duration()).timestamp_millis();
            all_klines.extend(klines);
        }

        all_klines.retain(|k| range.contains(k.open_time));
        all_klines.sort_by_key(|k| k.open_time);
        all_klines.dedup_by_key(|k| k.open_time);

        info!(symbol, %interval, count = all_klines.len(), "Fetched kline history");

        Ok(all_klines)
    }
}

fn encode(params: &Params) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(200) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

/// 429/418 (rate limited or banned) and 5xx are retryable; other failures carry
/// the venue's error code when the body has one
fn map_status(status: StatusCode, body: &str) -> ExchangeError {
    if status == StatusCode::TOO_MANY_REQUESTS
        || status.as_u16() == 418
        || status.is_server_error()
    {
        return ExchangeError::Transient(format!("HTTP {}: {}", status, truncate(body)));
    }

    match serde_json::from_str::<ApiError>(body) {
        Ok(err) => ExchangeError::Rejected {
            code: err.code,
            message: err.msg,
        },
        Err(_) => ExchangeError::Rejected {
            code: i64::from(status.as_u16()),
            message: truncate(body).to_string(),
        },
    }
}
