//! Deterministic stand-in data used when Polymarket is unreachable
//!
//! The generators are seeded from the base price so the same market always
//! renders the same book and chart between refreshes.

use chrono::{DateTime, Utc};
use polyperps_core::{Market, OrderBook, OrderBookLevel, PricePoint};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Levels generated on each side of a mock book
pub const MOCK_BOOK_DEPTH: usize = 10;

/// Points in a mock history (hourly, oldest first)
pub const MOCK_HISTORY_POINTS: i64 = 101;

const TICK: Decimal = dec!(0.01);
const MIN_BOOK_PRICE: Decimal = dec!(0.01);
const MAX_BOOK_PRICE: Decimal = dec!(0.99);

/// Pseudo-random value in `[0, 1)` derived from `sin(seed)`
pub fn seeded_random(seed: f64) -> f64 {
    let x = seed.sin() * 10000.0;
    x - x.floor()
}

fn price_seed(base_price: f64) -> f64 {
    (base_price * 1000.0).floor()
}

fn mock_size(seed: f64) -> Decimal {
    Decimal::from((seeded_random(seed) * 5000.0).floor() as i64 + 500)
}

/// Ten levels a side stepping one cent away from `base_price`
pub fn mock_order_book(base_price: Decimal) -> OrderBook {
    let seed = price_seed(base_price.to_f64().unwrap_or(0.5));

    let mut bids = Vec::with_capacity(MOCK_BOOK_DEPTH);
    let mut asks = Vec::with_capacity(MOCK_BOOK_DEPTH);

    for i in 0..MOCK_BOOK_DEPTH {
        let offset = TICK * Decimal::from(i + 1);
        let step = i as f64;

        bids.push(OrderBookLevel::new(
            (base_price - offset).max(MIN_BOOK_PRICE),
            mock_size(seed + step),
        ));
        asks.push(OrderBookLevel::new(
            (base_price + offset).min(MAX_BOOK_PRICE),
            mock_size(seed + step + 100.0),
        ));
    }

    OrderBook { bids, asks }
}

/// Hourly random walk that drifts toward and ends exactly at `base_price`
pub fn mock_price_history(base_price: f64, now: DateTime<Utc>) -> Vec<PricePoint> {
    let now = (now.timestamp_millis() / 3_600_000) * 3600;
    let seed = price_seed(base_price);

    let mut price = base_price * 0.85;
    let mut history = Vec::with_capacity(MOCK_HISTORY_POINTS as usize);

    for i in (0..MOCK_HISTORY_POINTS).rev() {
        price += (seeded_random(seed + i as f64) - 0.45) * 0.015;
        price += (base_price - price) * 0.02;
        price = price.clamp(0.02, 0.98);

        history.push(PricePoint {
            time: now - i * 3600,
            value: price,
        });
    }

    if let Some(last) = history.last_mut() {
        last.value = base_price;
    }

    history
}

struct MockListing {
    n: u32,
    question: &'static str,
    slug: &'static str,
    condition_id: &'static str,
    yes_price: Decimal,
    volume: Decimal,
    volume_24hr: Decimal,
    liquidity: Decimal,
    end_date: &'static str,
}

impl MockListing {
    fn into_market(self) -> Market {
        Market {
            id: self.n.to_string(),
            question: self.question.to_string(),
            slug: self.slug.to_string(),
            condition_id: self.condition_id.to_string(),
            outcomes: vec!["Yes".to_string(), "No".to_string()],
            yes_price: self.yes_price,
            no_price: Decimal::ONE - self.yes_price,
            volume: self.volume,
            volume_24hr: self.volume_24hr,
            liquidity: self.liquidity,
            best_bid: self.yes_price - TICK,
            best_ask: self.yes_price + TICK,
            token_ids: vec![
                format!("mock-token-yes-{}", self.n),
                format!("mock-token-no-{}", self.n),
            ],
            end_date: Some(self.end_date.to_string()),
            image: None,
            active: true,
        }
    }
}

/// The fixed fallback catalogue of eight markets
pub fn mock_markets() -> Vec<Market> {
    vec![
        MockListing {
            n: 1,
            question: "Will Bitcoin reach $150,000 by end of 2025?",
            slug: "bitcoin-150k-2025",
            condition_id: "mock-btc-1",
            yes_price: dec!(0.42),
            volume: dec!(2500000),
            volume_24hr: dec!(185000),
            liquidity: dec!(450000),
            end_date: "2025-12-31T23:59:59Z",
        },
        MockListing {
            n: 2,
            question: "Will Trump win the 2028 Presidential Election?",
            slug: "trump-2028-president",
            condition_id: "mock-trump-2",
            yes_price: dec!(0.35),
            volume: dec!(8500000),
            volume_24hr: dec!(520000),
            liquidity: dec!(1200000),
            end_date: "2028-11-05T23:59:59Z",
        },
        MockListing {
            n: 3,
            question: "Will Ethereum flip Bitcoin market cap in 2025?",
            slug: "eth-flip-btc-2025",
            condition_id: "mock-eth-3",
            yes_price: dec!(0.12),
            volume: dec!(1800000),
            volume_24hr: dec!(95000),
            liquidity: dec!(280000),
            end_date: "2025-12-31T23:59:59Z",
        },
        MockListing {
            n: 4,
            question: "Will the Fed cut rates in January 2025?",
            slug: "fed-rate-cut-jan-2025",
            condition_id: "mock-fed-4",
            yes_price: dec!(0.08),
            volume: dec!(3200000),
            volume_24hr: dec!(280000),
            liquidity: dec!(520000),
            end_date: "2025-01-31T23:59:59Z",
        },
        MockListing {
            n: 5,
            question: "Will SpaceX successfully land humans on Mars by 2030?",
            slug: "spacex-mars-2030",
            condition_id: "mock-spacex-5",
            yes_price: dec!(0.22),
            volume: dec!(950000),
            volume_24hr: dec!(45000),
            liquidity: dec!(180000),
            end_date: "2030-12-31T23:59:59Z",
        },
        MockListing {
            n: 6,
            question: "Will Apple release AR glasses in 2025?",
            slug: "apple-ar-glasses-2025",
            condition_id: "mock-apple-6",
            yes_price: dec!(0.55),
            volume: dec!(1200000),
            volume_24hr: dec!(78000),
            liquidity: dec!(220000),
            end_date: "2025-12-31T23:59:59Z",
        },
        MockListing {
            n: 7,
            question: "Will Solana reach $500 in 2025?",
            slug: "solana-500-2025",
            condition_id: "mock-sol-7",
            yes_price: dec!(0.28),
            volume: dec!(1650000),
            volume_24hr: dec!(125000),
            liquidity: dec!(310000),
            end_date: "2025-12-31T23:59:59Z",
        },
        MockListing {
            n: 8,
            question: "Will there be a US recession in 2025?",
            slug: "us-recession-2025",
            condition_id: "mock-recession-8",
            yes_price: dec!(0.32),
            volume: dec!(4100000),
            volume_24hr: dec!(195000),
            liquidity: dec!(680000),
            end_date: "2025-12-31T23:59:59Z",
        },
    ]
    .into_iter()
    .map(MockListing::into_market)
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_seeded_random_is_stable_and_bounded() {
        for seed in [0.0, 1.0, 420.0, 999.0, 12345.0] {
            let r = seeded_random(seed);
            assert!((0.0..1.0).contains(&r));
            assert_eq!(r, seeded_random(seed));
        }
        assert_eq!(seeded_random(0.0), 0.0);
    }

    #[test]
    fn test_mock_markets_catalogue() {
        let markets = mock_markets();
        assert_eq!(markets.len(), 8);

        let btc = &markets[0];
        assert_eq!(btc.yes_price, dec!(0.42));
        assert_eq!(btc.no_price, dec!(0.58));
        assert_eq!(btc.best_bid, dec!(0.41));
        assert_eq!(btc.best_ask, dec!(0.43));
        assert_eq!(btc.token_ids[0], "mock-token-yes-1");

        let recession = &markets[7];
        assert_eq!(recession.condition_id, "mock-recession-8");
        assert_eq!(recession.volume, dec!(4100000));
    }

    #[test]
    fn test_mock_order_book_shape() {
        let book = mock_order_book(dec!(0.42));
        assert_eq!(book.bids.len(), MOCK_BOOK_DEPTH);
        assert_eq!(book.asks.len(), MOCK_BOOK_DEPTH);
        assert_eq!(book.bids[0].price, dec!(0.41));
        assert_eq!(book.bids[9].price, dec!(0.32));
        assert_eq!(book.asks[0].price, dec!(0.43));
        assert_eq!(book.asks[9].price, dec!(0.52));

        for level in book.bids.iter().chain(book.asks.iter()) {
            assert!(level.size >= dec!(500) && level.size < dec!(5500));
        }

        assert_eq!(book, mock_order_book(dec!(0.42)));
    }

    #[test]
    fn test_mock_order_book_clamps_at_edges() {
        let book = mock_order_book(dec!(0.03));
        assert!(book.bids.iter().all(|l| l.price >= dec!(0.01)));
        assert_eq!(book.bids[9].price, dec!(0.01));

        let book = mock_order_book(dec!(0.97));
        assert!(book.asks.iter().all(|l| l.price <= dec!(0.99)));
        assert_eq!(book.asks[9].price, dec!(0.99));
    }

    #[test]
    fn test_mock_price_history_shape() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 34, 56).unwrap();
        let history = mock_price_history(0.42, now);

        assert_eq!(history.len(), 101);
        let hour = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap().timestamp();
        assert_eq!(history.last().unwrap().time, hour);
        assert_eq!(history.first().unwrap().time, hour - 100 * 3600);
        assert_eq!(history.last().unwrap().value, 0.42);

        for pair in history.windows(2) {
            assert_eq!(pair[1].time - pair[0].time, 3600);
        }
        assert!(history.iter().all(|p| (0.02..=0.98).contains(&p.value)));

        assert_eq!(history, mock_price_history(0.42, now));
    }
}
