//! Core types for the PolyPerps terminal
//!
//! This crate defines the shared data structures used across the workspace:
//! normalized market data, leveraged positions, limit orders, trade records
//! and accounts.

pub mod account;
pub mod error;
pub mod market;
pub mod position;

pub use account::Account;
pub use error::{PerpsError, PerpsResult};
pub use market::{Market, OrderBook, OrderBookLevel, PricePoint, Spread, Timeframe};
pub use position::{
    LimitOrder, MarketRef, OrderStatus, Position, Side, TradeKind, TradeRecord,
};
