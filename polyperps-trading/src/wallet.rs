//! Account wallets - generation and loading
//!
//! Wallets give every account a real Ethereum address. They never sign or
//! send anything; no funds move on chain.

use alloy::primitives::{Address, B256};
use alloy::signers::local::PrivateKeySigner;
use std::str::FromStr;
use tracing::{debug, info};

use crate::types::{Result, TradingError};

#[derive(Clone)]
pub struct TradingWallet {
    signer: PrivateKeySigner,
    address: Address,
}

impl TradingWallet {
    /// Create a new wallet from a private key hex string
    pub fn from_private_key(private_key: &str) -> Result<Self> {
        let key = private_key.trim();
        let key = key.strip_prefix("0x").unwrap_or(key);

        let key_bytes = B256::from_str(key)
            .map_err(|e| TradingError::Wallet(format!("Invalid private key format: {}", e)))?;

        let signer = PrivateKeySigner::from_bytes(&key_bytes)
            .map_err(|e| TradingError::Wallet(format!("Failed to create signer: {}", e)))?;

        let address = signer.address();

        debug!("Loaded wallet: {}", address);

        Ok(Self { signer, address })
    }

    /// Generate a new random wallet
    pub fn generate() -> Self {
        let signer = PrivateKeySigner::random();
        let address = signer.address();

        info!("Generated new wallet: {}", address);

        Self { signer, address }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Get the wallet address as a checksummed string
    pub fn address_string(&self) -> String {
        self.address.to_checksum(None)
    }

    /// Get private key as hex string (be careful with this!)
    pub fn private_key_hex(&self) -> String {
        format!("0x{}", hex::encode(self.signer.credential().to_bytes()))
    }
}

impl std::fmt::Debug for TradingWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TradingWallet")
            .field("address", &self.address)
            .finish()
    }
}
