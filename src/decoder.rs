//! Push frame parsing and typed decoding
//!
//! Inbound frames are JSON arrays `[channelId, sequence, payload]`. Shorter frames are
//! heartbeats or acknowledgements. The ticker channel carries one positional ticker
//! record per frame; market channels carry a batch of tagged sub-events.

use crate::{
    data::*,
    directory::{ChannelDirectory, TICKER_CHANNEL_ID},
    error::DecodeError,
};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::sync::Arc;

/// Updates decoded from one frame, in wire order
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    pub channel_id: u64,
    /// Directory name of the channel the frame arrived on
    pub channel: String,
    pub sequence: Option<u64>,
    pub updates: Vec<PushUpdate>,
}

/// Frame decoder bound to one client's channel directory
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    directory: Arc<ChannelDirectory>,
}

impl FrameDecoder {
    pub fn new(directory: Arc<ChannelDirectory>) -> Self {
        Self { directory }
    }

    /// Decode one raw frame.
    ///
    /// Returns `Ok(None)` for frames that are discarded without error: invalid JSON,
    /// fewer than three elements, a non-numeric channel id, a non-array payload or
    /// an unknown channel. A field that fails to parse drops the whole frame.
    pub fn decode(&self, raw: &str) -> Result<Option<DecodedFrame>, DecodeError> {
        let frame: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(_) => {
                tracing::trace!("Discarding non-JSON frame");
                return Ok(None);
            }
        };

        let elements = match frame.as_array() {
            Some(elements) if elements.len() >= 3 => elements,
            _ => {
                tracing::trace!("Discarding heartbeat frame: {}", raw);
                return Ok(None);
            }
        };

        let channel_id = match channel_id(&elements[0]) {
            Some(id) => id,
            None => return Ok(None),
        };
        let payload = match elements[2].as_array() {
            Some(payload) => payload,
            None => return Ok(None),
        };
        let channel = match self.directory.name_of(channel_id) {
            Some(name) => name.to_string(),
            None => {
                tracing::trace!("Discarding frame for unknown channel {}", channel_id);
                return Ok(None);
            }
        };

        let updates = if channel_id == TICKER_CHANNEL_ID {
            vec![PushUpdate::Ticker(self.decode_ticker(payload)?)]
        } else {
            decode_market_events(payload)?
        };

        Ok(Some(DecodedFrame {
            channel_id,
            channel,
            sequence: elements[1].as_u64(),
            updates,
        }))
    }

    /// Decode a positional ticker payload.
    ///
    /// The symbol is the directory name of the echoed market id, or the id itself when
    /// the market is unknown.
    pub fn decode_ticker(&self, payload: &[Value]) -> Result<TickerUpdate, DecodeError> {
        let market_id = payload
            .first()
            .and_then(channel_id)
            .ok_or(DecodeError::Ticker { field: "CurrencyPair" })?;
        let symbol = self
            .directory
            .name_of(market_id)
            .map(str::to_string)
            .unwrap_or_else(|| market_id.to_string());

        let field = |index: usize, name: &'static str| {
            decimal_at(payload, index).ok_or(DecodeError::Ticker { field: name })
        };

        let last = field(1, "Last")?;
        let lowest_ask = field(2, "LowestAsk")?;
        let highest_bid = field(3, "HighestBid")?;
        let percent_change = field(4, "PercentChange")?;
        let base_volume = field(5, "BaseVolume")?;
        let quote_volume = field(6, "QuoteVolume")?;
        let is_frozen = payload
            .get(7)
            .and_then(Value::as_f64)
            .map(|code| code != 0.0)
            .ok_or(DecodeError::Ticker { field: "IsFrozen" })?;
        let high_24hr = field(8, "High24hr")?;
        let low_24hr = field(9, "Low24hr")?;

        Ok(TickerUpdate {
            symbol,
            last,
            lowest_ask,
            highest_bid,
            percent_change,
            base_volume,
            quote_volume,
            is_frozen,
            high_24hr,
            low_24hr,
        })
    }
}

/// Decode a market channel batch. The first failing sub-event aborts the batch.
pub fn decode_market_events(payload: &[Value]) -> Result<Vec<PushUpdate>, DecodeError> {
    let mut updates = Vec::with_capacity(payload.len());

    for event in payload {
        let fields = match event.as_array() {
            Some(fields) => fields,
            None => continue,
        };

        match fields.first().and_then(Value::as_str) {
            Some("i") => updates.push(PushUpdate::OrderDepth(decode_depth_snapshot(fields)?)),
            Some("o") => updates.push(decode_book_delta(fields)?),
            Some("t") => updates.push(PushUpdate::NewTrade(decode_trade(fields)?)),
            Some(other) => tracing::trace!("Skipping sub-event with tag {:?}", other),
            None => {}
        }
    }

    Ok(updates)
}

/// `["o", side, rate, amount]`
fn decode_book_delta(fields: &[Value]) -> Result<PushUpdate, DecodeError> {
    let side = fields
        .get(1)
        .and_then(Value::as_f64)
        .map(BookSide::from_flag)
        .ok_or(DecodeError::OrderBook { field: "TypeOrder" })?;
    let rate = decimal_at(fields, 2).ok_or(DecodeError::OrderBook { field: "Rate" })?;

    let amount_str = fields
        .get(3)
        .and_then(Value::as_str)
        .ok_or(DecodeError::OrderBook { field: "Amount" })?;
    if amount_str == REMOVED_AMOUNT {
        return Ok(PushUpdate::OrderBookRemove(OrderBookRemove { side, rate }));
    }
    let amount = parse_decimal(amount_str).ok_or(DecodeError::OrderBook { field: "Amount" })?;

    Ok(PushUpdate::OrderBookModify(OrderBookModify { side, rate, amount }))
}

/// `["t", tradeId, side, rate, amount, total]`; total is a JSON number, the rest strings
fn decode_trade(fields: &[Value]) -> Result<NewTrade, DecodeError> {
    let trade_id = fields
        .get(1)
        .and_then(Value::as_str)
        .and_then(|s| s.trim().parse::<i64>().ok())
        .ok_or(DecodeError::NewTrade { field: "TradeId" })?;
    let side = fields
        .get(2)
        .and_then(Value::as_f64)
        .map(TradeSide::from_flag)
        .ok_or(DecodeError::NewTrade { field: "TypeOrder" })?;
    let rate = decimal_at(fields, 3).ok_or(DecodeError::NewTrade { field: "Rate" })?;
    let amount = decimal_at(fields, 4).ok_or(DecodeError::NewTrade { field: "Amount" })?;
    let total = fields
        .get(5)
        .and_then(Value::as_f64)
        .ok_or(DecodeError::NewTrade { field: "Total" })?;

    Ok(NewTrade {
        trade_id,
        side,
        rate,
        amount,
        total,
    })
}

/// `["i", {"currencyPair": "...", "orderBook": [asks, bids]}]`
fn decode_depth_snapshot(fields: &[Value]) -> Result<OrderDepthSnapshot, DecodeError> {
    let body = fields
        .get(1)
        .and_then(Value::as_object)
        .ok_or(DecodeError::OrderBook { field: "OrderBook" })?;
    let symbol = body
        .get("currencyPair")
        .and_then(Value::as_str)
        .ok_or(DecodeError::OrderBook { field: "CurrencyPair" })?
        .to_string();
    let sides = body
        .get("orderBook")
        .and_then(Value::as_array)
        .ok_or(DecodeError::OrderBook { field: "OrderBook" })?;

    let mut asks = sides
        .first()
        .and_then(Value::as_object)
        .ok_or(DecodeError::OrderBook { field: "Asks" })
        .and_then(price_levels)?;
    let mut bids = sides
        .get(1)
        .and_then(Value::as_object)
        .ok_or(DecodeError::OrderBook { field: "Bids" })
        .and_then(price_levels)?;

    asks.sort_by(|a, b| a.price.partial_cmp(&b.price).unwrap_or(Ordering::Equal));
    bids.sort_by(|a, b| b.price.partial_cmp(&a.price).unwrap_or(Ordering::Equal));

    Ok(OrderDepthSnapshot { symbol, asks, bids })
}

fn price_levels(side: &Map<String, Value>) -> Result<Vec<PriceLevel>, DecodeError> {
    side.iter()
        .map(|(price, quantity)| {
            let price = parse_decimal(price).ok_or(DecodeError::OrderBook { field: "Price" })?;
            let quantity = quantity
                .as_str()
                .and_then(parse_decimal)
                .ok_or(DecodeError::OrderBook { field: "Quantity" })?;
            Ok(PriceLevel { price, quantity })
        })
        .collect()
}

/// Channel ids arrive as JSON numbers; anything else is not a channel frame
fn channel_id(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64)),
        _ => None,
    }
}

fn decimal_at(values: &[Value], index: usize) -> Option<f64> {
    values.get(index).and_then(Value::as_str).and_then(parse_decimal)
}

fn parse_decimal(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|f| f.is_finite())
}
