//! Market data with graceful degradation
//!
//! [`MarketDataService`] never surfaces an upstream failure to callers. When
//! Polymarket is down, or a token is a mock placeholder, it answers with the
//! deterministic data from [`crate::mock`] (or `None` for spread/midpoint).

use crate::client::{usable_token_id, PolymarketClient};
use crate::mock::{mock_markets, mock_order_book, mock_price_history};
use async_trait::async_trait;
use chrono::Utc;
use polyperps_core::{Market, OrderBook, PerpsResult, PricePoint, Spread, Timeframe};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{debug, warn};

/// A source of raw Polymarket data
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn list_markets(&self, limit: u32, offset: u32) -> PerpsResult<Vec<Market>>;

    async fn spread(&self, token_id: &str) -> PerpsResult<Spread>;

    async fn midpoint(&self, token_id: &str) -> PerpsResult<Option<Decimal>>;

    async fn order_book(&self, token_id: &str) -> PerpsResult<OrderBook>;

    async fn price_history(
        &self,
        token_id: &str,
        interval: &str,
        fidelity: u32,
    ) -> PerpsResult<Vec<PricePoint>>;
}

#[async_trait]
impl MarketDataSource for PolymarketClient {
    async fn list_markets(&self, limit: u32, offset: u32) -> PerpsResult<Vec<Market>> {
        PolymarketClient::list_markets(self, limit, offset).await
    }

    async fn spread(&self, token_id: &str) -> PerpsResult<Spread> {
        self.get_spread(token_id).await
    }

    async fn midpoint(&self, token_id: &str) -> PerpsResult<Option<Decimal>> {
        self.get_midpoint(token_id).await
    }

    async fn order_book(&self, token_id: &str) -> PerpsResult<OrderBook> {
        self.get_order_book(token_id).await
    }

    async fn price_history(
        &self,
        token_id: &str,
        interval: &str,
        fidelity: u32,
    ) -> PerpsResult<Vec<PricePoint>> {
        self.get_price_history(token_id, interval, fidelity).await
    }
}

/// Market data facade used by the API layer
pub struct MarketDataService<S = PolymarketClient> {
    source: S,
}

impl<S: MarketDataSource> MarketDataService<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Active markets by volume, or the mock catalogue if Gamma fails.
    ///
    /// A successful response with no tradeable markets is returned as-is.
    pub async fn fetch_markets(&self, limit: u32, offset: u32) -> Vec<Market> {
        match self.source.list_markets(limit, offset).await {
            Ok(markets) => markets,
            Err(e) => {
                warn!("Market listing failed, serving mock markets: {}", e);
                mock_markets()
            }
        }
    }

    pub async fn fetch_spread(&self, token_id: &str) -> Option<Spread> {
        let token_id = usable_token_id(token_id)?;
        match self.source.spread(&token_id).await {
            Ok(spread) => Some(spread),
            Err(e) => {
                debug!("Spread unavailable for {}: {}", token_id, e);
                None
            }
        }
    }

    pub async fn fetch_midpoint(&self, token_id: &str) -> Option<Decimal> {
        let token_id = usable_token_id(token_id)?;
        match self.source.midpoint(&token_id).await {
            Ok(mid) => mid,
            Err(e) => {
                debug!("Midpoint unavailable for {}: {}", token_id, e);
                None
            }
        }
    }

    /// Live book, or a mock book around `base_price` when the token is a
    /// placeholder, the request fails, or both sides come back empty
    pub async fn fetch_order_book(&self, token_id: &str, base_price: Decimal) -> OrderBook {
        let Some(token_id) = usable_token_id(token_id) else {
            debug!("Using mock order book - no valid token id");
            return mock_order_book(base_price);
        };

        match self.source.order_book(&token_id).await {
            Ok(book) if !book.is_empty() => book,
            Ok(_) => {
                debug!("Empty order book for {}, using mock at {}", token_id, base_price);
                mock_order_book(base_price)
            }
            Err(e) => {
                warn!("Order book fetch failed for {}: {}", token_id, e);
                mock_order_book(base_price)
            }
        }
    }

    /// Chart history for a timeframe, with the same fallback rules as the book
    pub async fn fetch_price_history(
        &self,
        token_id: &str,
        timeframe: Timeframe,
        base_price: Decimal,
    ) -> Vec<PricePoint> {
        self.fetch_price_history_with(token_id, timeframe.interval(), timeframe.fidelity(), base_price)
            .await
    }

    pub async fn fetch_price_history_with(
        &self,
        token_id: &str,
        interval: &str,
        fidelity: u32,
        base_price: Decimal,
    ) -> Vec<PricePoint> {
        let mock = || mock_price_history(base_price.to_f64().unwrap_or(0.5), Utc::now());

        let Some(token_id) = usable_token_id(token_id) else {
            debug!("Using mock price history - no valid token id");
            return mock();
        };

        match self.source.price_history(&token_id, interval, fidelity).await {
            Ok(history) if !history.is_empty() => history,
            Ok(_) => {
                debug!("No history for {}, using mock at {}", token_id, base_price);
                mock()
            }
            Err(e) => {
                warn!("Price history fetch failed for {}: {}", token_id, e);
                mock()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polyperps_core::{OrderBookLevel, PerpsError};
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TOKEN: &str = "71321045679252212594626385532706912750332728571942532289631379312455583992563";

    /// Source that always errors and counts how often it was asked
    #[derive(Default)]
    struct DownSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MarketDataSource for DownSource {
        async fn list_markets(&self, _: u32, _: u32) -> PerpsResult<Vec<Market>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(PerpsError::network("connection refused"))
        }
        async fn spread(&self, _: &str) -> PerpsResult<Spread> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(PerpsError::network("connection refused"))
        }
        async fn midpoint(&self, _: &str) -> PerpsResult<Option<Decimal>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(PerpsError::network("connection refused"))
        }
        async fn order_book(&self, _: &str) -> PerpsResult<OrderBook> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(PerpsError::network("connection refused"))
        }
        async fn price_history(&self, _: &str, _: &str, _: u32) -> PerpsResult<Vec<PricePoint>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(PerpsError::network("connection refused"))
        }
    }

    /// Source that answers with fixed data, recording the last token id seen
    struct FixedSource {
        book: OrderBook,
        history: Vec<PricePoint>,
        last_token: parking_lot::Mutex<Option<String>>,
    }

    impl FixedSource {
        fn new(book: OrderBook, history: Vec<PricePoint>) -> Self {
            Self {
                book,
                history,
                last_token: parking_lot::Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl MarketDataSource for FixedSource {
        async fn list_markets(&self, _: u32, _: u32) -> PerpsResult<Vec<Market>> {
            Ok(Vec::new())
        }
        async fn spread(&self, token_id: &str) -> PerpsResult<Spread> {
            *self.last_token.lock() = Some(token_id.to_string());
            Ok(Spread {
                bid: Some(dec!(0.41)),
                ask: Some(dec!(0.43)),
                spread: Some(dec!(0.02)),
            })
        }
        async fn midpoint(&self, _: &str) -> PerpsResult<Option<Decimal>> {
            Ok(Some(dec!(0.42)))
        }
        async fn order_book(&self, _: &str) -> PerpsResult<OrderBook> {
            Ok(self.book.clone())
        }
        async fn price_history(&self, _: &str, _: &str, _: u32) -> PerpsResult<Vec<PricePoint>> {
            Ok(self.history.clone())
        }
    }

    #[tokio::test]
    async fn test_markets_fall_back_to_mock() {
        let service = MarketDataService::new(DownSource::default());
        let markets = service.fetch_markets(100, 0).await;
        assert_eq!(markets.len(), 8);
        assert!(markets.iter().all(|m| m.token_ids[0].starts_with("mock-")));
    }

    #[tokio::test]
    async fn test_empty_listing_is_not_replaced() {
        let service = MarketDataService::new(FixedSource::new(OrderBook::default(), Vec::new()));
        assert!(service.fetch_markets(100, 0).await.is_empty());
    }

    #[tokio::test]
    async fn test_mock_tokens_skip_network() {
        let source = DownSource::default();
        let service = MarketDataService::new(source);

        assert_eq!(service.fetch_spread("mock-token-yes-1").await, None);
        assert_eq!(service.fetch_midpoint("mock-token-yes-1").await, None);

        let book = service.fetch_order_book("mock-token-yes-1", dec!(0.42)).await;
        assert_eq!(book.bids.len(), 10);

        let history = service
            .fetch_price_history("mock-token-yes-1", Timeframe::OneDay, dec!(0.42))
            .await;
        assert_eq!(history.len(), 101);

        assert_eq!(service.source().calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failures_degrade() {
        let service = MarketDataService::new(DownSource::default());

        assert_eq!(service.fetch_spread(TOKEN).await, None);
        assert_eq!(service.fetch_midpoint(TOKEN).await, None);
        assert_eq!(service.fetch_order_book(TOKEN, dec!(0.3)).await, mock_order_book(dec!(0.3)));

        let history = service.fetch_price_history(TOKEN, Timeframe::OneWeek, dec!(0.3)).await;
        assert_eq!(history.last().map(|p| p.value), Some(0.3));

        assert_eq!(service.source().calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_live_data_passes_through() {
        let live_book = OrderBook::from_levels(
            vec![OrderBookLevel::new(dec!(0.40), dec!(10))],
            vec![OrderBookLevel::new(dec!(0.44), dec!(12))],
        );
        let live_history = vec![PricePoint { time: 1_700_000_000, value: 0.4 }];
        let service = MarketDataService::new(FixedSource::new(live_book.clone(), live_history.clone()));

        let spread = service.fetch_spread(&format!("[\"{}\"]", TOKEN)).await.unwrap();
        assert_eq!(spread.spread, Some(dec!(0.02)));
        assert_eq!(service.source().last_token.lock().as_deref(), Some(TOKEN));

        assert_eq!(service.fetch_midpoint(TOKEN).await, Some(dec!(0.42)));
        assert_eq!(service.fetch_order_book(TOKEN, dec!(0.5)).await, live_book);
        assert_eq!(
            service.fetch_price_history(TOKEN, Timeframe::OneHour, dec!(0.5)).await,
            live_history
        );
    }

    #[tokio::test]
    async fn test_empty_live_book_uses_mock() {
        let service = MarketDataService::new(FixedSource::new(OrderBook::default(), Vec::new()));
        assert_eq!(service.fetch_order_book(TOKEN, dec!(0.6)).await, mock_order_book(dec!(0.6)));
        assert_eq!(
            service.fetch_price_history(TOKEN, Timeframe::Max, dec!(0.6)).await.len(),
            101
        );
    }
}
