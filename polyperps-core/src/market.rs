//! Normalized market data structures

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A binary prediction market in the terminal's normalized shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Market {
    /// Gamma market id, falling back to condition id then slug
    pub id: String,

    /// Human-readable question
    pub question: String,

    pub slug: String,

    pub condition_id: String,

    /// Outcome labels, typically `["Yes", "No"]`
    pub outcomes: Vec<String>,

    /// Current YES price (0.00 - 1.00, represents probability)
    pub yes_price: Decimal,

    /// Current NO price (should be ~1 - yes_price)
    pub no_price: Decimal,

    pub volume: Decimal,

    pub volume_24hr: Decimal,

    pub liquidity: Decimal,

    pub best_bid: Decimal,

    pub best_ask: Decimal,

    /// CLOB token ids, YES token first
    pub token_ids: Vec<String>,

    /// Resolution date as reported upstream
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    pub active: bool,
}

// ============================================================================
// Order Book Types
// ============================================================================

/// A single price level in the order book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBookLevel {
    /// Price (0.00 - 1.00 representing probability)
    pub price: Decimal,
    /// Total size resting at this level
    pub size: Decimal,
}

impl OrderBookLevel {
    pub fn new(price: Decimal, size: Decimal) -> Self {
        Self { price, size }
    }
}

/// Order book snapshot for one outcome token
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBook {
    /// Sorted by price descending (best bid first)
    pub bids: Vec<OrderBookLevel>,
    /// Sorted by price ascending (best ask first)
    pub asks: Vec<OrderBookLevel>,
}

impl OrderBook {
    /// Build a book from unsorted levels.
    ///
    /// Levels with a non-positive price or size are discarded, bids are sorted
    /// highest first and asks lowest first.
    pub fn from_levels<B, A>(bids: B, asks: A) -> Self
    where
        B: IntoIterator<Item = OrderBookLevel>,
        A: IntoIterator<Item = OrderBookLevel>,
    {
        let keep = |level: &OrderBookLevel| level.price > Decimal::ZERO && level.size > Decimal::ZERO;

        let mut bids: Vec<OrderBookLevel> = bids.into_iter().filter(keep).collect();
        let mut asks: Vec<OrderBookLevel> = asks.into_iter().filter(keep).collect();

        bids.sort_by(|a, b| b.price.cmp(&a.price));
        asks.sort_by(|a, b| a.price.cmp(&b.price));

        Self { bids, asks }
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first().map(|l| l.price)
    }

    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first().map(|l| l.price)
    }

    /// Best ask minus best bid
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }
}

/// Top-of-book spread as reported by the CLOB `/spread` endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spread {
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
    pub spread: Option<Decimal>,
}

// ============================================================================
// Price History Types
// ============================================================================

/// A single chart point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    /// Unix timestamp in seconds
    pub time: i64,
    /// Price (0.0 - 1.0)
    pub value: f64,
}

/// Chart timeframe with the CLOB fidelity (minutes per point) it maps to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "6h")]
    SixHours,
    #[default]
    #[serde(rename = "1d")]
    OneDay,
    #[serde(rename = "1w")]
    OneWeek,
    #[serde(rename = "max")]
    Max,
}

impl Timeframe {
    /// Interval string understood by `/prices-history`
    pub fn interval(&self) -> &'static str {
        match self {
            Timeframe::OneHour => "1h",
            Timeframe::SixHours => "6h",
            Timeframe::OneDay => "1d",
            Timeframe::OneWeek => "1w",
            Timeframe::Max => "max",
        }
    }

    /// Fidelity in minutes (lower = more data points)
    pub fn fidelity(&self) -> u32 {
        match self {
            Timeframe::OneHour | Timeframe::SixHours => 1,
            Timeframe::OneDay => 5,
            Timeframe::OneWeek | Timeframe::Max => 60,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.interval())
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "1h" => Ok(Timeframe::OneHour),
            "6h" => Ok(Timeframe::SixHours),
            "1d" => Ok(Timeframe::OneDay),
            "1w" => Ok(Timeframe::OneWeek),
            "max" | "all" => Ok(Timeframe::Max),
            _ => Err(format!("Unknown timeframe: {}", s)),
        }
    }
}
