//! Public market data types returned by the REST API

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// One market row of `returnTicker`.
///
/// `id` is the numeric channel identifier the push API uses for this market.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Ticker {
    pub id: u64,
    pub last: Decimal,
    pub lowest_ask: Decimal,
    pub highest_bid: Decimal,
    pub percent_change: Decimal,
    pub base_volume: Decimal,
    pub quote_volume: Decimal,
    #[serde(deserialize_with = "de_flag")]
    pub is_frozen: bool,
    #[serde(rename = "high24hr")]
    pub high_24hr: Decimal,
    #[serde(rename = "low24hr")]
    pub low_24hr: Decimal,
}

/// `return24hVolume`: per-market volumes keyed by currency, plus the `total*` figures
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Volume {
    pub volumes: HashMap<String, HashMap<String, Decimal>>,
    /// Keyed by currency, e.g. `BTC` for `totalBTC`
    pub totals: HashMap<String, Decimal>,
}

impl<'de> Deserialize<'de> for Volume {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw: HashMap<String, Value> = HashMap::deserialize(deserializer)?;
        let mut volume = Volume::default();

        for (key, value) in raw {
            if let Some(currency) = key.strip_prefix("total") {
                let total: Decimal = serde_json::from_value(value).map_err(de::Error::custom)?;
                volume.totals.insert(currency.to_string(), total);
            } else {
                let per_currency: HashMap<String, Decimal> =
                    serde_json::from_value(value).map_err(de::Error::custom)?;
                volume.volumes.insert(key, per_currency);
            }
        }

        Ok(volume)
    }
}

/// Price level of a REST order book snapshot. The wire form is `[price, quantity]`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(from = "(Decimal, Decimal)")]
pub struct BookLevel {
    pub price: Decimal,
    pub quantity: Decimal,
}

impl From<(Decimal, Decimal)> for BookLevel {
    fn from((price, quantity): (Decimal, Decimal)) -> Self {
        Self { price, quantity }
    }
}

/// `returnOrderBook` for a single market
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderBook {
    pub asks: Vec<BookLevel>,
    pub bids: Vec<BookLevel>,
    #[serde(deserialize_with = "de_flag")]
    pub is_frozen: bool,
    pub seq: u64,
}

impl fmt::Display for OrderBook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OrderBook[seq {}]: {} asks, {} bids", self.seq, self.asks.len(), self.bids.len())
    }
}

/// One row of the public `returnTradeHistory`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublicTrade {
    #[serde(rename = "globalTradeID")]
    pub global_trade_id: u64,
    #[serde(rename = "tradeID")]
    pub trade_id: u64,
    #[serde(deserialize_with = "de_datetime")]
    pub date: DateTime<Utc>,
    #[serde(rename = "type")]
    pub side: String,
    pub rate: Decimal,
    pub amount: Decimal,
    pub total: Decimal,
}

/// `returnChartData` candle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CandleStick {
    #[serde(with = "chrono::serde::ts_seconds")]
    pub date: DateTime<Utc>,
    pub high: Decimal,
    pub low: Decimal,
    pub open: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub quote_volume: Decimal,
    pub weighted_average: Decimal,
}

/// Candle width accepted by `returnChartData`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartPeriod {
    FiveMinutes,
    FifteenMinutes,
    ThirtyMinutes,
    TwoHours,
    FourHours,
    OneDay,
}

impl ChartPeriod {
    pub fn as_secs(&self) -> i64 {
        match self {
            ChartPeriod::FiveMinutes => 300,
            ChartPeriod::FifteenMinutes => 900,
            ChartPeriod::ThirtyMinutes => 1800,
            ChartPeriod::TwoHours => 7200,
            ChartPeriod::FourHours => 14400,
            ChartPeriod::OneDay => 86400,
        }
    }
}

impl std::str::FromStr for ChartPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "5m" => Ok(ChartPeriod::FiveMinutes),
            "15m" => Ok(ChartPeriod::FifteenMinutes),
            "30m" => Ok(ChartPeriod::ThirtyMinutes),
            "2h" => Ok(ChartPeriod::TwoHours),
            "4h" => Ok(ChartPeriod::FourHours),
            "1d" => Ok(ChartPeriod::OneDay),
            other => Err(format!("Invalid period: {}", other)),
        }
    }
}

/// `returnCurrencies` row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Currency {
    pub id: u64,
    pub name: String,
    pub tx_fee: Decimal,
    pub min_conf: u32,
    pub deposit_address: Option<String>,
    #[serde(deserialize_with = "de_flag")]
    pub disabled: bool,
    #[serde(deserialize_with = "de_flag")]
    pub delisted: bool,
    #[serde(deserialize_with = "de_flag")]
    pub frozen: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoanOffer {
    pub rate: Decimal,
    pub amount: Decimal,
    pub range_min: u32,
    pub range_max: u32,
}

/// `returnLoanOrders`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoanOrders {
    pub offers: Vec<LoanOffer>,
    pub demands: Vec<LoanOffer>,
}

/// Accepts `0`/`1`, `"0"`/`"1"` or a JSON bool.
pub(crate) fn de_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Bool(b) => Ok(b),
        Value::Number(n) => Ok(n.as_f64().map(|v| v != 0.0).unwrap_or(false)),
        Value::String(s) => match s.trim() {
            "0" | "" => Ok(false),
            _ => Ok(true),
        },
        Value::Null => Ok(false),
        other => Err(de::Error::custom(format!("invalid flag: {}", other))),
    }
}

/// Poloniex reports trade dates as `YYYY-MM-DD HH:MM:SS` in UTC.
pub(crate) fn de_datetime<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|e| de::Error::custom(format!("invalid date {}: {}", raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_chart_period_parsing() {
        assert_eq!(ChartPeriod::from_str("2h").unwrap().as_secs(), 7200);
        assert!(ChartPeriod::from_str("1h").is_err());
    }

    #[test]
    fn test_volume_splits_totals() {
        let json = r#"{
            "BTC_LTC": {"BTC": "2.23248854", "LTC": "87.10381314"},
            "totalBTC": "81.89657704",
            "totalUSDT": "1200.5"
        }"#;
        let volume: Volume = serde_json::from_str(json).unwrap();
        assert_eq!(volume.volumes.len(), 1);
        assert_eq!(volume.totals.len(), 2);
        assert_eq!(volume.totals["BTC"], Decimal::from_str("81.89657704").unwrap());
    }
}
