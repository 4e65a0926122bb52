//! Trading API data types

use crate::market::{de_datetime, de_flag};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Order side
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn command(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

/// `returnCompleteBalances` entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Balance {
    pub available: Decimal,
    pub on_orders: Decimal,
    pub btc_value: Decimal,
}

/// Open order as returned by `returnOpenOrders`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OpenOrder {
    pub order_number: String,
    #[serde(rename = "type")]
    pub side: OrderSide,
    pub rate: Decimal,
    pub starting_amount: Decimal,
    pub amount: Decimal,
    pub total: Decimal,
    #[serde(deserialize_with = "de_datetime")]
    pub date: DateTime<Utc>,
    #[serde(default, deserialize_with = "de_flag")]
    pub margin: bool,
}

/// Result of `cancelOrder`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CancelResponse {
    #[serde(deserialize_with = "de_flag")]
    pub success: bool,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Private `returnTradeHistory` row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TradeHistory {
    pub global_trade_id: u64,
    pub trade_id: String,
    #[serde(deserialize_with = "de_datetime")]
    pub date: DateTime<Utc>,
    pub rate: Decimal,
    pub amount: Decimal,
    pub total: Decimal,
    pub fee: Decimal,
    pub order_number: String,
    #[serde(rename = "type")]
    pub side: OrderSide,
    pub category: String,
}

/// `returnOrderTrades` row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderTrade {
    #[serde(alias = "globalTradeID")]
    pub global_trade_id: u64,
    #[serde(alias = "tradeID")]
    pub trade_id: u64,
    pub currency_pair: String,
    #[serde(rename = "type")]
    pub side: OrderSide,
    pub rate: Decimal,
    pub amount: Decimal,
    pub total: Decimal,
    pub fee: Decimal,
    #[serde(deserialize_with = "de_datetime")]
    pub date: DateTime<Utc>,
}

/// `returnOrderStatus` result entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatus {
    pub status: String,
    pub rate: Decimal,
    pub amount: Decimal,
    pub currency_pair: String,
    #[serde(deserialize_with = "de_datetime")]
    pub date: DateTime<Utc>,
    pub total: Decimal,
    #[serde(rename = "type")]
    pub side: OrderSide,
    pub starting_amount: Decimal,
}

/// Raw `returnOrderStatus` envelope. `result` is an error object when the order is unknown.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct OrderStatusEnvelope {
    #[serde(deserialize_with = "de_flag")]
    pub success: bool,
    pub result: serde_json::Value,
}

/// Fill reported when an order is placed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResultingTrade {
    pub amount: Decimal,
    #[serde(deserialize_with = "de_datetime")]
    pub date: DateTime<Utc>,
    pub rate: Decimal,
    pub total: Decimal,
    #[serde(alias = "tradeID")]
    pub trade_id: String,
    #[serde(rename = "type")]
    pub side: OrderSide,
}

/// Response to `buy`/`sell`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub order_number: String,
    #[serde(default)]
    pub resulting_trades: Vec<ResultingTrade>,
}

/// `returnAvailableAccountBalances`: available amounts per account
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Accounts {
    #[serde(default)]
    pub exchange: HashMap<String, Decimal>,
    #[serde(default)]
    pub margin: HashMap<String, Decimal>,
    #[serde(default)]
    pub lending: HashMap<String, Decimal>,
}

/// Result of `generateNewAddress`. `response` holds the address, or the reason on failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewAddress {
    #[serde(deserialize_with = "de_flag")]
    pub success: bool,
    pub response: String,
}

/// `returnBalances`: currency → available amount
pub type Balances = HashMap<String, Decimal>;

/// `returnOpenOrders` with `currencyPair=all`
pub type AllOpenOrders = HashMap<String, Vec<OpenOrder>>;
