//! Leveraged position, order and trade record structures

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which outcome a position is exposed to.
///
/// YES is the long side (profits when the price rises), NO is the short side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Yes,
    No,
}

impl Side {
    /// Direction multiplier applied to price moves
    pub fn sign(&self) -> Decimal {
        match self {
            Side::Yes => Decimal::ONE,
            Side::No => Decimal::NEGATIVE_ONE,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Yes => f.write_str("YES"),
            Side::No => f.write_str("NO"),
        }
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "YES" | "LONG" => Ok(Side::Yes),
            "NO" | "SHORT" => Ok(Side::No),
            _ => Err(format!("Unknown side: {}", s)),
        }
    }
}

/// The market fields copied onto positions, orders and history entries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketRef {
    pub id: String,
    pub question: String,
    #[serde(default)]
    pub slug: String,
}

/// An open leveraged position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub id: String,
    pub market_id: String,
    pub market_question: String,
    pub market_slug: String,
    pub side: Side,
    /// USD notional
    pub size: Decimal,
    pub leverage: Decimal,
    pub entry_price: Decimal,
    /// Posted collateral, `size / leverage`
    pub margin: Decimal,
    pub liquidation_price: Decimal,
    pub opened_at: DateTime<Utc>,
}

/// Lifecycle of a resting limit order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    Open,
}

/// A resting, unfilled limit order. Its margin is reserved from the balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitOrder {
    pub id: String,
    pub market_id: String,
    pub market_question: String,
    pub market_slug: String,
    pub side: Side,
    pub size: Decimal,
    pub leverage: Decimal,
    pub limit_price: Decimal,
    pub margin: Decimal,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeKind {
    Open,
    Close,
}

/// Immutable history entry for an open or close event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: TradeKind,
    pub market_question: String,
    pub side: Side,
    pub size: Decimal,
    pub leverage: Decimal,
    /// Fill price for OPEN events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_price: Option<Decimal>,
    /// Realized PnL, CLOSE events only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pnl: Option<Decimal>,
    /// Realized return on margin in percent, CLOSE events only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roi: Option<Decimal>,
    pub timestamp: DateTime<Utc>,
}
