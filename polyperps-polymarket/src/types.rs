//! Polymarket API response types and normalization
//!
//! Gamma and the CLOB are loose about types: prices arrive as strings or
//! numbers, and array fields such as `outcomePrices` and `clobTokenIds` are
//! frequently JSON-encoded strings. Everything here is lenient on input and
//! produces the strict shapes from `polyperps_core`.

use polyperps_core::{Market, OrderBook, OrderBookLevel, PricePoint, Spread};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::str::FromStr;

/// Token ids this short are placeholders, not real CLOB asset ids
const MIN_TOKEN_ID_LEN: usize = 10;

const DEFAULT_PRICE: Decimal = dec!(0.5);
const BOOK_TICK: Decimal = dec!(0.01);

// ============================================================================
// Lenient value helpers
// ============================================================================

/// Parse a decimal from text, accepting plain and scientific notation
pub fn parse_decimal(text: &str) -> Option<Decimal> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}

/// Interpret a JSON string or number as a decimal
pub fn value_to_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) => parse_decimal(s),
        Value::Number(n) => parse_decimal(&n.to_string()),
        _ => None,
    }
}

fn value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

fn value_to_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
        }
        _ => None,
    }
}

fn lenient_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_to_decimal))
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Strings from a field that may be a JSON array or a JSON-encoded array
fn string_list(value: &Value) -> Option<Vec<String>> {
    let items = match value {
        Value::Array(items) => items.clone(),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Array(items)) => items,
            _ => return None,
        },
        _ => return None,
    };

    Some(
        items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
    )
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

// ============================================================================
// Gamma API
// ============================================================================

/// Raw market as returned by `GET /markets` on the Gamma API
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GammaMarket {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub condition_id: Option<String>,
    #[serde(default)]
    pub outcomes: Option<Value>,
    #[serde(default)]
    pub outcome_prices: Option<Value>,
    #[serde(default)]
    pub clob_token_ids: Option<Value>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub volume: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub volume_num: Option<Decimal>,
    #[serde(default, rename = "volume24hr", deserialize_with = "lenient_decimal")]
    pub volume_24hr: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub liquidity: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub liquidity_num: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub best_bid: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub best_ask: Option<Decimal>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub end_date_iso: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
}

impl GammaMarket {
    /// YES and NO prices from `outcomePrices`.
    ///
    /// A JSON array needs at least two entries to be used at all. Each price
    /// that is missing, unparseable or zero becomes 0.5.
    pub fn outcome_price_pair(&self) -> (Decimal, Decimal) {
        let defaults = (DEFAULT_PRICE, DEFAULT_PRICE);
        let Some(raw) = self.outcome_prices.as_ref() else {
            return defaults;
        };

        let parts: Vec<Option<Decimal>> = match raw {
            Value::Array(items) if items.len() >= 2 => items.iter().map(value_to_decimal).collect(),
            Value::String(s) => match serde_json::from_str::<Value>(s) {
                Ok(Value::Array(items)) if items.len() >= 2 => {
                    items.iter().map(value_to_decimal).collect()
                }
                Ok(_) => return defaults,
                // Not valid JSON: treat as a bare comma-separated list
                Err(_) => s
                    .split(',')
                    .map(|part| {
                        let cleaned: String = part
                            .chars()
                            .filter(|c| !matches!(c, '[' | ']' | '"' | '\''))
                            .collect();
                        parse_decimal(&cleaned)
                    })
                    .collect(),
            },
            _ => return defaults,
        };

        let price_at = |i: usize| {
            parts
                .get(i)
                .copied()
                .flatten()
                .filter(|p| !p.is_zero())
                .unwrap_or(DEFAULT_PRICE)
        };
        (price_at(0), price_at(1))
    }

    /// CLOB token ids with placeholder entries removed
    pub fn token_ids(&self) -> Vec<String> {
        let Some(raw) = self.clob_token_ids.as_ref() else {
            return Vec::new();
        };

        let ids = match raw {
            // A single bare id rather than an encoded array
            Value::String(s) if !s.trim_start().starts_with('[') => vec![s.trim().to_string()],
            other => string_list(other).unwrap_or_default(),
        };

        ids.into_iter()
            .map(|id| id.trim().to_string())
            .filter(|id| id.len() > MIN_TOKEN_ID_LEN)
            .collect()
    }

    pub fn outcome_labels(&self) -> Vec<String> {
        self.outcomes
            .as_ref()
            .and_then(string_list)
            .filter(|labels| !labels.is_empty())
            .unwrap_or_else(|| vec!["Yes".to_string(), "No".to_string()])
    }

    /// Convert into the terminal's market shape
    pub fn normalize(&self) -> Market {
        let (yes_price, no_price) = self.outcome_price_pair();

        let id = non_empty(&self.id)
            .or_else(|| non_empty(&self.condition_id))
            .or_else(|| non_empty(&self.slug))
            .unwrap_or_default()
            .to_string();

        let positive = |d: &Decimal| !d.is_zero();

        Market {
            id,
            question: self.question.clone().unwrap_or_default(),
            slug: self.slug.clone().unwrap_or_default(),
            condition_id: self.condition_id.clone().unwrap_or_default(),
            outcomes: self.outcome_labels(),
            yes_price,
            no_price,
            volume: self
                .volume_num
                .filter(positive)
                .or(self.volume)
                .unwrap_or_default(),
            volume_24hr: self.volume_24hr.unwrap_or_default(),
            liquidity: self
                .liquidity_num
                .filter(positive)
                .or(self.liquidity)
                .unwrap_or_default(),
            best_bid: self
                .best_bid
                .filter(positive)
                .unwrap_or(yes_price - BOOK_TICK),
            best_ask: self
                .best_ask
                .filter(positive)
                .unwrap_or(yes_price + BOOK_TICK),
            token_ids: self.token_ids(),
            end_date: non_empty(&self.end_date)
                .or_else(|| non_empty(&self.end_date_iso))
                .map(str::to_string),
            image: non_empty(&self.image).map(str::to_string),
            active: self.active != Some(false),
        }
    }
}

/// Normalize a Gamma listing: drop untradeable entries, largest volume first
pub fn normalize_markets(raw: &[GammaMarket]) -> Vec<Market> {
    let mut markets: Vec<Market> = raw
        .iter()
        .map(GammaMarket::normalize)
        .filter(|m| !m.question.trim().is_empty() && !m.token_ids.is_empty())
        .collect();

    markets.sort_by(|a, b| b.volume.cmp(&a.volume));
    markets
}

// ============================================================================
// CLOB API
// ============================================================================

/// Price level as sent by the CLOB (strings on the wire)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawLevel {
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub price: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub size: Option<Decimal>,
}

impl RawLevel {
    fn to_level(&self) -> OrderBookLevel {
        OrderBookLevel::new(
            self.price.unwrap_or_default(),
            self.size.unwrap_or_default(),
        )
    }
}

/// Build a sorted, filtered book from raw CLOB levels
pub fn book_from_raw(bids: &[RawLevel], asks: &[RawLevel]) -> OrderBook {
    OrderBook::from_levels(
        bids.iter().map(RawLevel::to_level),
        asks.iter().map(RawLevel::to_level),
    )
}

/// Response from `GET /book`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClobBookResponse {
    #[serde(default)]
    pub market: Option<String>,
    #[serde(default)]
    pub asset_id: Option<String>,
    #[serde(default)]
    pub bids: Vec<RawLevel>,
    #[serde(default)]
    pub asks: Vec<RawLevel>,
    #[serde(default)]
    pub hash: Option<String>,
}

impl ClobBookResponse {
    pub fn to_order_book(&self) -> OrderBook {
        book_from_raw(&self.bids, &self.asks)
    }
}

/// Response from `GET /spread`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SpreadResponse {
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub bid: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub ask: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub spread: Option<Decimal>,
}

impl SpreadResponse {
    /// Zero values are reported upstream for empty books; treat them as absent
    pub fn to_spread(&self) -> Spread {
        let present = |d: Option<Decimal>| d.filter(|d| !d.is_zero());
        Spread {
            bid: present(self.bid),
            ask: present(self.ask),
            spread: present(self.spread),
        }
    }
}

/// Response from `GET /midpoint`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MidpointResponse {
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub mid: Option<Decimal>,
}

impl MidpointResponse {
    pub fn midpoint(&self) -> Option<Decimal> {
        self.mid.filter(|d| !d.is_zero())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawHistoryPoint {
    #[serde(default)]
    pub t: Option<Value>,
    #[serde(default)]
    pub p: Option<Value>,
}

/// Response from `GET /prices-history`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PricesHistoryResponse {
    #[serde(default)]
    pub history: Vec<RawHistoryPoint>,
}

/// Clean raw history into chart points.
///
/// Points with a non-positive time or value are dropped, the rest are sorted
/// by time and only the last point for any given timestamp is kept.
pub fn normalize_history(raw: &[RawHistoryPoint]) -> Vec<PricePoint> {
    let mut points: Vec<PricePoint> = raw
        .iter()
        .filter_map(|point| {
            let time = point.t.as_ref().and_then(value_to_timestamp)?;
            let value = point.p.as_ref().and_then(value_to_f64)?;
            (time > 0 && value > 0.0 && value.is_finite()).then_some(PricePoint { time, value })
        })
        .collect();

    // Stable sort keeps arrival order within a timestamp
    points.sort_by_key(|p| p.time);

    let mut deduped: Vec<PricePoint> = Vec::with_capacity(points.len());
    for point in points {
        match deduped.last_mut() {
            Some(last) if last.time == point.time => *last = point,
            _ => deduped.push(point),
        }
    }
    deduped
}
