//! Polymarket API client
//!
//! Thin wrapper over the public Gamma and CLOB REST endpoints. Every method
//! returns the raw `Result`; the mock fallbacks live in [`crate::service`].

use crate::types::{
    normalize_history, normalize_markets, ClobBookResponse, GammaMarket, MidpointResponse,
    PricesHistoryResponse, SpreadResponse,
};
use polyperps_core::{Market, OrderBook, PerpsError, PerpsResult, PricePoint, Spread};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, instrument};

/// Base URL for Polymarket Gamma API
pub const GAMMA_API_BASE: &str = "https://gamma-api.polymarket.com";

/// Base URL for Polymarket CLOB API
pub const CLOB_API_BASE: &str = "https://clob.polymarket.com";

/// Default page size for the market listing
pub const DEFAULT_MARKET_LIMIT: u32 = 100;

const MIN_TOKEN_ID_LEN: usize = 10;

/// Strip brackets and quotes that leak in from JSON-encoded token lists
pub fn clean_token_id(token_id: &str) -> String {
    token_id
        .chars()
        .filter(|c| !matches!(c, '[' | ']' | '"' | '\''))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Mock or placeholder ids never hit the network
pub fn is_mock_token(token_id: &str) -> bool {
    let token_id = token_id.trim();
    token_id.is_empty() || token_id.starts_with("mock-") || token_id.len() < MIN_TOKEN_ID_LEN
}

/// The cleaned token id, or `None` if it is a mock/placeholder
pub fn usable_token_id(token_id: &str) -> Option<String> {
    let cleaned = clean_token_id(token_id);
    (!is_mock_token(&cleaned)).then_some(cleaned)
}

/// Polymarket API client
#[derive(Clone)]
pub struct PolymarketClient {
    client: Client,
    gamma_url: String,
    clob_url: String,
}

impl PolymarketClient {
    /// Create a client against the public Polymarket endpoints
    pub fn new() -> PerpsResult<Self> {
        Self::with_urls(GAMMA_API_BASE, CLOB_API_BASE)
    }

    /// Create a client against custom base URLs (trailing slashes are trimmed)
    pub fn with_urls(gamma_url: impl Into<String>, clob_url: impl Into<String>) -> PerpsResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| PerpsError::internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            gamma_url: gamma_url.into().trim_end_matches('/').to_string(),
            clob_url: clob_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn gamma_url(&self) -> &str {
        &self.gamma_url
    }

    pub fn clob_url(&self) -> &str {
        &self.clob_url
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
        what: &str,
    ) -> PerpsResult<T> {
        debug!("Fetching {} from: {}", what, url);

        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| PerpsError::network(format!("Failed to fetch {}: {}", what, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PerpsError::api(format!(
                "Polymarket API error ({}) fetching {}: {}",
                status, what, body
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| PerpsError::parse(format!("Failed to parse {} response: {}", what, e)))
    }

    /// List active, open markets from Gamma, normalized and sorted by volume
    #[instrument(skip(self))]
    pub async fn list_markets(&self, limit: u32, offset: u32) -> PerpsResult<Vec<Market>> {
        let url = format!("{}/markets", self.gamma_url);
        let query = [
            ("limit", limit.to_string()),
            ("offset", offset.to_string()),
            ("closed", "false".to_string()),
            ("active", "true".to_string()),
        ];

        let raw: Vec<GammaMarket> = self.get_json(&url, &query, "markets").await?;
        let markets = normalize_markets(&raw);

        debug!("Normalized {} of {} Gamma markets", markets.len(), raw.len());
        Ok(markets)
    }

    #[instrument(skip(self))]
    pub async fn get_spread(&self, token_id: &str) -> PerpsResult<Spread> {
        let url = format!("{}/spread", self.clob_url);
        let response: SpreadResponse = self
            .get_json(&url, &[("token_id", token_id.to_string())], "spread")
            .await?;
        Ok(response.to_spread())
    }

    #[instrument(skip(self))]
    pub async fn get_midpoint(&self, token_id: &str) -> PerpsResult<Option<Decimal>> {
        let url = format!("{}/midpoint", self.clob_url);
        let response: MidpointResponse = self
            .get_json(&url, &[("token_id", token_id.to_string())], "midpoint")
            .await?;
        Ok(response.midpoint())
    }

    #[instrument(skip(self))]
    pub async fn get_order_book(&self, token_id: &str) -> PerpsResult<OrderBook> {
        let url = format!("{}/book", self.clob_url);
        let response: ClobBookResponse = self
            .get_json(&url, &[("token_id", token_id.to_string())], "orderbook")
            .await?;
        Ok(response.to_order_book())
    }

    /// Price history for a token.
    ///
    /// `interval` is one of 1h, 6h, 1d, 1w, max; `fidelity` is minutes per point.
    #[instrument(skip(self))]
    pub async fn get_price_history(
        &self,
        token_id: &str,
        interval: &str,
        fidelity: u32,
    ) -> PerpsResult<Vec<PricePoint>> {
        let url = format!("{}/prices-history", self.clob_url);
        let query = [
            ("market", token_id.to_string()),
            ("interval", interval.to_string()),
            ("fidelity", fidelity.to_string()),
        ];

        let response: PricesHistoryResponse =
            self.get_json(&url, &query, "price history").await?;
        Ok(normalize_history(&response.history))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_token_id() {
        assert_eq!(clean_token_id("[\"12345678901\"]"), "12345678901");
        assert_eq!(clean_token_id(" '98765432109' "), "98765432109");
    }

    #[test]
    fn test_mock_tokens_are_rejected() {
        assert!(is_mock_token("mock-token-yes-1"));
        assert!(is_mock_token(""));
        assert!(is_mock_token("123"));
        assert!(!is_mock_token("71321045679252212594626385532706912750332728571942532289631379312455583992563"));

        assert_eq!(usable_token_id("[\"mock-token-no-2\"]"), None);
        assert_eq!(
            usable_token_id("\"12345678901\""),
            Some("12345678901".to_string())
        );
    }

    #[test]
    fn test_with_urls_trims_trailing_slash() {
        let client = PolymarketClient::with_urls("http://gamma.local/", "http://clob.local//").unwrap();
        assert_eq!(client.gamma_url(), "http://gamma.local");
        assert_eq!(client.clob_url(), "http://clob.local");
    }
}
