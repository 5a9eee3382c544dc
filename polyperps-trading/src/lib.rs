//! PolyPerps Trading - leveraged paper trading on Polymarket prices
//!
//! This crate provides:
//! - Margin, liquidation and PnL math (`risk`)
//! - The per-account portfolio ledger (`ledger`)
//! - Accounts, sessions and wallet generation (`accounts`, `wallet`)
//! - Password hashing and key sealing (`keystore`)
//! - SQLite persistence (`storage`)
//!
//! Nothing here places real orders or moves funds on chain.

pub mod accounts;
pub mod keystore;
pub mod ledger;
pub mod risk;
pub mod storage;
pub mod types;
pub mod wallet;

pub use accounts::{AccountService, Session, SignIn};
pub use ledger::{position_pnl, CloseOutcome, Portfolio};
pub use risk::{OrderQuote, LEVERAGE_OPTIONS, MAX_LEVERAGE};
pub use storage::AccountStore;
pub use types::*;
pub use wallet::TradingWallet;
