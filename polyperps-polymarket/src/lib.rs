//! Polymarket integration for PolyPerps
//!
//! This crate talks to the public Gamma API (market listing and prices) and
//! the CLOB API (order book, spread, midpoint, price history), normalizes
//! their loosely-typed payloads, and falls back to deterministic mock data
//! whenever an upstream is unavailable. It also consumes the CLOB market
//! WebSocket for live price and book updates.
//!
//! None of these endpoints require authentication.

pub mod client;
pub mod mock;
pub mod service;
pub mod types;
pub mod websocket;

pub use client::{is_mock_token, usable_token_id, PolymarketClient, CLOB_API_BASE, GAMMA_API_BASE};
pub use service::{MarketDataService, MarketDataSource};
pub use websocket::{FeedConfig, FeedEvent, FeedSubscription, MarketFeed, POLYMARKET_WS_URL};
