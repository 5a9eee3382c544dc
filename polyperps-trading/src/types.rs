//! Shared types for paper trading and accounts

use polyperps_core::{MarketRef, Side};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ============================================================================
// Request Types
// ============================================================================

/// A market or limit order ticket as submitted by the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeRequest {
    pub market: MarketRef,
    pub side: Side,
    /// USD notional
    pub size: Decimal,
    pub leverage: Decimal,
    /// Fill price for market orders, limit price for limit orders
    pub price: Decimal,
}

// ============================================================================
// Error Types
// ============================================================================

/// Trading errors
#[derive(Debug, thiserror::Error)]
pub enum TradingError {
    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    #[error("Insufficient balance: margin {required} exceeds available {available}")]
    InsufficientBalance { required: Decimal, available: Decimal },

    #[error("Position not found: {0}")]
    PositionNotFound(String),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Email already registered: {0}")]
    EmailTaken(String),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Session not found or expired")]
    SessionNotFound,

    #[error("No private key available for this account")]
    KeyNotFound,

    #[error("Keystore error: {0}")]
    Keystore(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TradingError>;
