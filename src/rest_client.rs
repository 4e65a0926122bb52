//! REST API client for Poloniex
//!
//! Provides:
//! - Public market data queries (tickers, volumes, order books, trades, candles)
//! - Authenticated trading calls (balances, open orders, order placement and cancellation)
//!
//! Every request goes through a shared [`Throttle`].

use crate::auth::{Credentials, NonceGenerator};
use crate::data::ClientConfig;
use crate::error::SdkError;
use crate::market::*;
use crate::rate_limit::Throttle;
use crate::trading::*;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// REST API client for Poloniex
pub struct PoloniexRestClient {
    public_endpoint: String,
    trading_endpoint: String,
    credentials: Option<Credentials>,
    throttle: Arc<Throttle>,
    nonces: NonceGenerator,
    http_client: reqwest::Client,
}

impl PoloniexRestClient {
    /// Create a client from the SDK configuration.
    ///
    /// Credentials are optional; trading calls fail with an authentication error without them.
    pub fn new(config: &ClientConfig) -> Result<Self, SdkError> {
        let credentials = match (&config.api_key, &config.api_secret) {
            (Some(key), Some(secret)) => Some(Credentials::new(key, secret)?),
            _ => None,
        };

        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SdkError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self {
            public_endpoint: config.public_endpoint.clone(),
            trading_endpoint: config.trading_endpoint.clone(),
            credentials,
            throttle: Arc::new(Throttle::new(config.requests_per_second)),
            nonces: NonceGenerator::new(),
            http_client,
        })
    }

    /// Public-only client against the default endpoints
    pub fn public() -> Result<Self, SdkError> {
        Self::new(&ClientConfig::default())
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn throttle(&self) -> &Throttle {
        &self.throttle
    }

    // ========== Public Endpoints ==========

    /// All markets with their push channel ids
    pub async fn get_tickers(&self) -> Result<HashMap<String, Ticker>, SdkError> {
        self.public_request("returnTicker", &[]).await
    }

    pub async fn get_24h_volumes(&self) -> Result<Volume, SdkError> {
        self.public_request("return24hVolume", &[]).await
    }

    pub async fn get_order_book(&self, market: &str, depth: u32) -> Result<OrderBook, SdkError> {
        let params = [
            ("currencyPair", market.to_uppercase()),
            ("depth", depth.to_string()),
        ];
        self.public_request("returnOrderBook", &params).await
    }

    /// Recent public trades, optionally bounded by a time range
    pub async fn get_public_trade_history(
        &self,
        market: &str,
        range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> Result<Vec<PublicTrade>, SdkError> {
        let mut params = vec![("currencyPair", market.to_uppercase())];
        if let Some((start, end)) = range {
            params.push(("start", start.timestamp().to_string()));
            params.push(("end", end.timestamp().to_string()));
        }
        self.public_request("returnTradeHistory", &params).await
    }

    /// Candles for a market. Without a range the last 24 hours are returned.
    pub async fn get_chart_data(
        &self,
        market: &str,
        range: Option<(DateTime<Utc>, DateTime<Utc>)>,
        period: ChartPeriod,
    ) -> Result<Vec<CandleStick>, SdkError> {
        let (start, end) = chart_range(range, period)?;

        let params = [
            ("currencyPair", market.to_uppercase()),
            ("start", start.timestamp().to_string()),
            ("end", end.timestamp().to_string()),
            ("period", period.as_secs().to_string()),
        ];
        self.public_request("returnChartData", &params).await
    }

    pub async fn get_currencies(&self) -> Result<HashMap<String, Currency>, SdkError> {
        self.public_request("returnCurrencies", &[]).await
    }

    pub async fn get_loan_orders(&self, currency: &str) -> Result<LoanOrders, SdkError> {
        let params = [("currency", currency.to_uppercase())];
        self.public_request("returnLoanOrders", &params).await
    }

    // ========== Trading Endpoints ==========

    pub async fn get_balances(&self) -> Result<Balances, SdkError> {
        self.trading_request("returnBalances", Vec::new()).await
    }

    pub async fn get_complete_balances(&self) -> Result<HashMap<String, Balance>, SdkError> {
        self.trading_request("returnCompleteBalances", Vec::new()).await
    }

    /// Balances split by account (exchange, margin, lending)
    pub async fn get_account_balances(&self) -> Result<Accounts, SdkError> {
        self.trading_request("returnAvailableAccountBalances", Vec::new()).await
    }

    /// currency → deposit address
    pub async fn get_deposit_addresses(&self) -> Result<HashMap<String, String>, SdkError> {
        self.trading_request("returnDepositAddresses", Vec::new()).await
    }

    pub async fn generate_new_address(&self, currency: &str) -> Result<NewAddress, SdkError> {
        let params = vec![("currency", currency.to_uppercase())];
        self.trading_request("generateNewAddress", params).await
    }

    pub async fn get_open_orders(&self, market: &str) -> Result<Vec<OpenOrder>, SdkError> {
        let params = vec![("currencyPair", market.to_uppercase())];
        self.trading_request("returnOpenOrders", params).await
    }

    /// Open orders for every market. Markets without orders map to an empty list.
    pub async fn get_all_open_orders(&self) -> Result<AllOpenOrders, SdkError> {
        let params = vec![("currencyPair", "all".to_string())];
        self.trading_request("returnOpenOrders", params).await
    }

    pub async fn cancel_order(&self, order_number: &str) -> Result<CancelResponse, SdkError> {
        let params = vec![("orderNumber", order_number.to_string())];
        self.trading_request("cancelOrder", params).await
    }

    pub async fn get_trade_history(
        &self,
        market: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<TradeHistory>, SdkError> {
        let params = vec![
            ("currencyPair", market.to_uppercase()),
            ("start", start.timestamp().to_string()),
            ("end", end.timestamp().to_string()),
            ("limit", limit.to_string()),
        ];
        self.trading_request("returnTradeHistory", params).await
    }

    pub async fn get_order_trades(&self, order_number: &str) -> Result<Vec<OrderTrade>, SdkError> {
        let params = vec![("orderNumber", order_number.to_string())];
        self.trading_request("returnOrderTrades", params).await
    }

    pub async fn get_order_status(&self, order_number: &str) -> Result<OrderStatus, SdkError> {
        let params = vec![("orderNumber", order_number.to_string())];
        let envelope: OrderStatusEnvelope = self.trading_request("returnOrderStatus", params).await?;
        order_status_from_envelope(order_number, envelope)
    }

    pub async fn buy(&self, market: &str, rate: f64, amount: f64) -> Result<OrderResponse, SdkError> {
        self.place_order(OrderSide::Buy, market, rate, amount).await
    }

    pub async fn sell(&self, market: &str, rate: f64, amount: f64) -> Result<OrderResponse, SdkError> {
        self.place_order(OrderSide::Sell, market, rate, amount).await
    }

    async fn place_order(
        &self,
        side: OrderSide,
        market: &str,
        rate: f64,
        amount: f64,
    ) -> Result<OrderResponse, SdkError> {
        if !(rate > 0.0) || !(amount > 0.0) {
            return Err(SdkError::InvalidArgument(format!(
                "rate and amount must be positive (rate={}, amount={})",
                rate, amount
            )));
        }

        let params = vec![
            ("currencyPair", market.to_uppercase()),
            ("rate", format!("{:.8}", rate)),
            ("amount", format!("{:.8}", amount)),
        ];
        tracing::info!("Placing {} order on {}: {:.8} @ {:.8}", side.command(), market, amount, rate);
        self.trading_request(side.command(), params).await
    }

    // ========== Internal Methods ==========

    async fn public_request<T: DeserializeOwned>(
        &self,
        command: &str,
        params: &[(&str, String)],
    ) -> Result<T, SdkError> {
        self.throttle.acquire().await;

        let response = self
            .http_client
            .get(&self.public_endpoint)
            .header("Accept", "application/json")
            .query(&[("command", command)])
            .query(params)
            .send()
            .await
            .map_err(|e| SdkError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SdkError::Network(e.to_string()))?;

        tracing::debug!("Poloniex public response [{}]: {}", command, log_snippet(&body));
        decode_response(status, &body)
    }

    async fn trading_request<T: DeserializeOwned>(
        &self,
        command: &str,
        params: Vec<(&str, String)>,
    ) -> Result<T, SdkError> {
        let credentials = self
            .credentials
            .as_ref()
            .ok_or_else(|| SdkError::Authentication("Set the API key and API secret".to_string()))?;

        self.throttle.acquire().await;

        let nonce = self.nonces.next();
        let form_data = encode_form(command, nonce, &params);
        let signature = credentials.sign(&form_data)?;

        let response = self
            .http_client
            .post(&self.trading_endpoint)
            .header("Accept", "application/json")
            .header("Content-Type", "application/x-www-form-urlencoded")
            .header("Key", credentials.api_key())
            .header("Sign", signature)
            .body(form_data)
            .send()
            .await
            .map_err(|e| SdkError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SdkError::Network(e.to_string()))?;

        tracing::debug!("Poloniex trading response [{}]: {}", command, log_snippet(&body));
        decode_response(status, &body)
    }
}

/// URL-encoded trading form body: `command`, `nonce`, then the call parameters
pub(crate) fn encode_form(command: &str, nonce: u64, params: &[(&str, String)]) -> String {
    let mut form = url::form_urlencoded::Serializer::new(String::new());
    form.append_pair("command", command);
    form.append_pair("nonce", &nonce.to_string());
    for (key, value) in params {
        form.append_pair(key, value);
    }
    form.finish()
}

/// First 200 characters of a response body, cut on a char boundary
pub(crate) fn log_snippet(body: &str) -> &str {
    body.char_indices()
        .nth(200)
        .map_or(body, |(end, _)| &body[..end])
}

/// Server error bodies look like `{"error": "..."}` regardless of HTTP status
pub(crate) fn check_server_error(body: &str) -> Result<(), SdkError> {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        if let Some(message) = map.get("error").and_then(|e| e.as_str()) {
            return Err(SdkError::Server(message.to_string()));
        }
    }
    Ok(())
}

fn decode_response<T: DeserializeOwned>(status: reqwest::StatusCode, body: &str) -> Result<T, SdkError> {
    check_server_error(body)?;

    if !status.is_success() {
        return Err(SdkError::Network(format!("HTTP {}: {}", status, body)));
    }

    serde_json::from_str(body).map_err(|e| SdkError::Server(format!("Unexpected response: {}", e)))
}

/// Resolve the candle window, defaulting to the last 24 hours
pub(crate) fn chart_range(
    range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    period: ChartPeriod,
) -> Result<(DateTime<Utc>, DateTime<Utc>), SdkError> {
    match range {
        Some((start, end)) => {
            if (end - start).num_seconds() < period.as_secs() {
                return Err(SdkError::InvalidArgument(
                    "Time range shorter than one period".to_string(),
                ));
            }
            Ok((start, end))
        }
        None => {
            let end = Utc::now();
            Ok((end - ChronoDuration::days(1), end))
        }
    }
}

fn order_status_from_envelope(order_number: &str, envelope: OrderStatusEnvelope) -> Result<OrderStatus, SdkError> {
    if !envelope.success {
        let message = envelope.result["error"]
            .as_str()
            .unwrap_or("Unexpected result")
            .to_string();
        return Err(SdkError::Server(message));
    }

    let mut statuses: HashMap<String, OrderStatus> = serde_json::from_value(envelope.result)
        .map_err(|e| SdkError::Server(format!("Unexpected result: {}", e)))?;

    statuses
        .remove(order_number)
        .or_else(|| statuses.into_values().next())
        .ok_or_else(|| SdkError::Server("Unexpected result".to_string()))
}

impl std::fmt::Debug for PoloniexRestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoloniexRestClient")
            .field("public_endpoint", &self.public_endpoint)
            .field("trading_endpoint", &self.trading_endpoint)
            .field("credentials", &self.credentials)
            .field("throttle", &self.throttle.interval())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_form_orders_command_and_nonce_first() {
        let form = encode_form(
            "buy",
            42,
            &[("currencyPair", "BTC_ETH".to_string()), ("rate", "0.01000000".to_string())],
        );
        assert_eq!(form, "command=buy&nonce=42&currencyPair=BTC_ETH&rate=0.01000000");
    }

    #[test]
    fn test_log_snippet_cuts_on_char_boundary() {
        let body = format!("{}é{}", "a".repeat(199), "b".repeat(50));
        let snippet = log_snippet(&body);
        assert_eq!(snippet.chars().count(), 200);
        assert!(snippet.ends_with('é'));

        assert_eq!(log_snippet("short"), "short");
        let wide = "€".repeat(300);
        assert_eq!(log_snippet(&wide).chars().count(), 200);
    }

    #[test]
    fn test_debug_logging_of_non_ascii_body() {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .finish();
        let body = format!("{}é", "x".repeat(199));

        tracing::subscriber::with_default(subscriber, || {
            tracing::debug!("Poloniex public response [{}]: {}", "returnTicker", log_snippet(&body));
        });
        assert!(decode_response::<HashMap<String, Ticker>>(reqwest::StatusCode::OK, &body).is_err());
    }

    #[test]
    fn test_server_error_detected() {
        let err = check_server_error(r#"{"error":"Invalid API key/secret pair."}"#).unwrap_err();
        assert!(matches!(err, SdkError::Server(msg) if msg.contains("Invalid API key")));
        assert!(check_server_error(r#"{"BTC":"0.1"}"#).is_ok());
        assert!(check_server_error("[]").is_ok());
    }

    #[test]
    fn test_chart_range_rejects_short_window() {
        let end = Utc::now();
        let start = end - ChronoDuration::minutes(10);
        assert!(chart_range(Some((start, end)), ChartPeriod::FifteenMinutes).is_err());
        assert!(chart_range(Some((start, end)), ChartPeriod::FiveMinutes).is_ok());
    }

    #[test]
    fn test_chart_range_defaults_to_one_day() {
        let (start, end) = chart_range(None, ChartPeriod::OneDay).unwrap();
        assert_eq!((end - start).num_hours(), 24);
    }

    #[tokio::test]
    async fn test_trading_without_credentials_fails_fast() {
        let client = PoloniexRestClient::public().unwrap();
        let err = client.get_balances().await.unwrap_err();
        assert!(matches!(err, SdkError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_order_validation_happens_before_io() {
        let config = ClientConfig {
            api_key: Some("key".to_string()),
            api_secret: Some("secret".to_string()),
            ..Default::default()
        };
        let client = PoloniexRestClient::new(&config).unwrap();
        let err = client.buy("btc_eth", 0.0, 1.0).await.unwrap_err();
        assert!(matches!(err, SdkError::InvalidArgument(_)));
    }

    #[test]
    fn test_order_status_error_envelope() {
        let envelope: OrderStatusEnvelope = serde_json::from_str(
            r#"{"success":0,"result":{"error":"Order not found, or you are not the person who placed it."}}"#,
        )
        .unwrap();
        let err = order_status_from_envelope("123", envelope).unwrap_err();
        assert!(matches!(err, SdkError::Server(msg) if msg.starts_with("Order not found")));
    }
}
