//! Account (user) representation exposed to clients

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Public view of a terminal account.
///
/// Password hashes and sealed keys never leave the trading crate; this is
/// the shape returned over the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    /// Set for email-registered accounts, `None` for wallet-only sessions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub wallet_address: String,
    /// Available USD balance (margin in use is already deducted)
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn is_wallet_only(&self) -> bool {
        self.email.is_none()
    }
}
