//! Polymarket WebSocket client for real-time market data
//!
//! Maintains one lazily-opened connection to the CLOB market channel and fans
//! incoming `price_change` and `book` events out to per-token subscribers.
//!
//! Each call to [`MarketFeed::subscribe`] returns a [`FeedSubscription`]
//! handle. Dropping the handle unsubscribes it; once a token has no handles
//! left it is no longer re-subscribed after a reconnect.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt, StreamExt};
use parking_lot::Mutex;
use polyperps_core::OrderBook;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::interval;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::client::is_mock_token;
use crate::types::{book_from_raw, value_to_decimal, RawLevel};

/// Polymarket WebSocket URL (market channel - no auth required)
pub const POLYMARKET_WS_URL: &str = "wss://ws-subscriptions-clob.polymarket.com/ws/market";

/// Reconnect delay base
const RECONNECT_DELAY_BASE: Duration = Duration::from_secs(1);

/// Max reconnect attempts
const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Ping interval (Polymarket expects pings every 10s)
const PING_INTERVAL: Duration = Duration::from_secs(10);

/// Events buffered per subscription. A subscriber that falls further behind
/// misses events until it catches up.
const SUBSCRIBER_BUFFER: usize = 256;

/// Registry key for handles that receive every token's events
const WILDCARD: &str = "*";

// ============================================================================
// Wire and Event Types
// ============================================================================

/// Subscribe message for market channel
#[derive(Debug, Clone, Serialize)]
pub struct MarketSubscribeMessage {
    pub assets_ids: Vec<String>,
    #[serde(rename = "type")]
    pub msg_type: String,
}

impl MarketSubscribeMessage {
    pub fn new(assets_ids: Vec<String>) -> Self {
        Self {
            assets_ids,
            msg_type: "market".to_string(),
        }
    }
}

/// A normalized update delivered to subscribers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedEvent {
    PriceChange { asset_id: String, price: Decimal },
    Book { asset_id: String, book: OrderBook },
}

impl FeedEvent {
    pub fn asset_id(&self) -> &str {
        match self {
            FeedEvent::PriceChange { asset_id, .. } | FeedEvent::Book { asset_id, .. } => asset_id,
        }
    }
}

/// Parse one text frame into zero or more feed events.
///
/// Frames may carry a single object or an array of them. Objects without an
/// `asset_id`, unknown event types and keepalive replies yield nothing.
pub fn parse_feed_message(text: &str) -> Vec<FeedEvent> {
    let text = text.trim();
    if text.is_empty() || text.eq_ignore_ascii_case("PONG") {
        return Vec::new();
    }

    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            debug!("[Polymarket WS] Ignoring non-JSON frame: {}", e);
            return Vec::new();
        }
    };

    match value {
        Value::Array(items) => items.iter().flat_map(parse_event).collect(),
        other => parse_event(&other),
    }
}

fn parse_event(msg: &Value) -> Vec<FeedEvent> {
    let event_type = msg.get("event_type").and_then(Value::as_str).unwrap_or_default();
    let asset_id = msg.get("asset_id").and_then(Value::as_str);

    match event_type {
        "price_change" => {
            // Newer frames batch per-asset changes under `price_changes`
            if let Some(changes) = msg.get("price_changes").and_then(Value::as_array) {
                return changes
                    .iter()
                    .filter_map(|change| {
                        let asset_id = change.get("asset_id").and_then(Value::as_str).or(asset_id)?;
                        let price = change.get("price").and_then(value_to_decimal)?;
                        Some(FeedEvent::PriceChange {
                            asset_id: asset_id.to_string(),
                            price,
                        })
                    })
                    .collect();
            }

            let Some(asset_id) = asset_id else {
                return Vec::new();
            };
            let price = msg.get("price").and_then(value_to_decimal).or_else(|| {
                msg.get("changes")
                    .and_then(Value::as_array)
                    .and_then(|changes| changes.first())
                    .and_then(|first| first.get("price"))
                    .and_then(value_to_decimal)
            });

            price
                .map(|price| FeedEvent::PriceChange {
                    asset_id: asset_id.to_string(),
                    price,
                })
                .into_iter()
                .collect()
        }
        "book" => {
            let Some(asset_id) = asset_id else {
                return Vec::new();
            };
            let levels = |side: &str| -> Vec<RawLevel> {
                msg.get(side)
                    .cloned()
                    .and_then(|v| serde_json::from_value(v).ok())
                    .unwrap_or_default()
            };
            vec![FeedEvent::Book {
                asset_id: asset_id.to_string(),
                book: book_from_raw(&levels("bids"), &levels("asks")),
            }]
        }
        _ => Vec::new(),
    }
}

/// Backoff before reconnect attempt `attempt` (1-based): 1s, 2s, 4s, ...
pub fn reconnect_delay(attempt: u32) -> Duration {
    RECONNECT_DELAY_BASE * 2u32.pow(attempt.saturating_sub(1))
}

// ============================================================================
// Handler Registry
// ============================================================================

#[derive(Default)]
struct FeedShared {
    handlers: Mutex<HashMap<String, HashMap<u64, mpsc::Sender<FeedEvent>>>>,
    next_id: AtomicU64,
    connected: AtomicBool,
}

impl FeedShared {
    /// Register a handle; the bool is true when it is the first for `key`
    fn register(&self, key: &str) -> (u64, mpsc::Receiver<FeedEvent>, bool) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut handlers = self.handlers.lock();
        let entry = handlers.entry(key.to_string()).or_default();
        let first = entry.is_empty();
        entry.insert(id, tx);
        (id, rx, first)
    }

    fn remove(&self, key: &str, id: u64) {
        let mut handlers = self.handlers.lock();
        if let Some(entry) = handlers.get_mut(key) {
            entry.remove(&id);
            if entry.is_empty() {
                handlers.remove(key);
                debug!("[Polymarket WS] No handlers left for {}", key);
            }
        }
    }

    /// Tokens to (re)subscribe on connect
    fn tokens(&self) -> Vec<String> {
        self.handlers
            .lock()
            .keys()
            .filter(|key| key.as_str() != WILDCARD)
            .cloned()
            .collect()
    }

    fn dispatch(&self, event: FeedEvent) {
        let handlers = self.handlers.lock();
        for key in [event.asset_id(), WILDCARD] {
            if let Some(entry) = handlers.get(key) {
                for (id, tx) in entry {
                    match tx.try_send(event.clone()) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => {
                            debug!("[Polymarket WS] Subscriber {} lagging, dropped {} event", id, key);
                        }
                        // A closed receiver is cleaned up when its handle drops
                        Err(TrySendError::Closed(_)) => {}
                    }
                }
            }
        }
    }
}

// ============================================================================
// Feed
// ============================================================================

/// Configuration for MarketFeed
#[derive(Clone, Debug)]
pub struct FeedConfig {
    pub url: String,
    pub auto_reconnect: bool,
    pub max_reconnect_attempts: u32,
    pub ping_interval: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: POLYMARKET_WS_URL.to_string(),
            auto_reconnect: true,
            max_reconnect_attempts: MAX_RECONNECT_ATTEMPTS,
            ping_interval: PING_INTERVAL,
        }
    }
}

/// Commands sent to the WebSocket task
#[derive(Debug)]
enum FeedCommand {
    Subscribe { asset_ids: Vec<String> },
}

/// Live market data feed shared by all API clients
pub struct MarketFeed {
    shared: Arc<FeedShared>,
    command_tx: mpsc::UnboundedSender<FeedCommand>,
}

/// Receiving end of one subscription. Drop it to unsubscribe.
pub struct FeedSubscription {
    key: String,
    id: u64,
    rx: mpsc::Receiver<FeedEvent>,
    shared: Arc<FeedShared>,
}

impl FeedSubscription {
    /// Token this handle listens to, `"*"` for a wildcard handle
    pub fn token_id(&self) -> &str {
        &self.key
    }

    pub async fn recv(&mut self) -> Option<FeedEvent> {
        self.rx.recv().await
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        self.shared.remove(&self.key, self.id);
    }
}

impl std::fmt::Debug for FeedSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedSubscription")
            .field("token_id", &self.key)
            .field("id", &self.id)
            .finish()
    }
}

impl MarketFeed {
    /// Create the feed and spawn its connection task.
    ///
    /// Must be called inside a Tokio runtime. No connection is opened until
    /// the first token subscription arrives.
    pub fn spawn(config: FeedConfig) -> Self {
        let (feed, command_rx) = Self::detached();
        let shared = Arc::clone(&feed.shared);

        tokio::spawn(async move {
            Self::connection_loop(config, shared, command_rx).await;
        });

        feed
    }

    fn detached() -> (Self, mpsc::UnboundedReceiver<FeedCommand>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        (
            Self {
                shared: Arc::new(FeedShared::default()),
                command_tx,
            },
            command_rx,
        )
    }

    /// Subscribe to one token's updates.
    ///
    /// Returns `None` for mock or placeholder tokens, which have no live feed.
    pub fn subscribe(&self, token_id: &str) -> Option<FeedSubscription> {
        let token_id = token_id.trim();
        if is_mock_token(token_id) {
            return None;
        }

        let (id, rx, first) = self.shared.register(token_id);
        if first {
            info!("[Polymarket WS] Subscribing to {}", token_id);
            if self
                .command_tx
                .send(FeedCommand::Subscribe {
                    asset_ids: vec![token_id.to_string()],
                })
                .is_err()
            {
                warn!("[Polymarket WS] Connection task has stopped");
            }
        }

        Some(FeedSubscription {
            key: token_id.to_string(),
            id,
            rx,
            shared: Arc::clone(&self.shared),
        })
    }

    /// Receive every token's updates. Does not by itself open a connection.
    pub fn subscribe_all(&self) -> FeedSubscription {
        let (id, rx, _) = self.shared.register(WILDCARD);
        FeedSubscription {
            key: WILDCARD.to_string(),
            id,
            rx,
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Relaxed)
    }

    /// Tokens that currently have at least one live handle
    pub fn subscribed_tokens(&self) -> Vec<String> {
        self.shared.tokens()
    }

    async fn send_subscribe<S>(write: &mut S, asset_ids: Vec<String>) -> bool
    where
        S: Sink<Message> + Unpin,
        S::Error: std::fmt::Display,
    {
        if asset_ids.is_empty() {
            return true;
        }
        let msg = MarketSubscribeMessage::new(asset_ids);
        match serde_json::to_string(&msg) {
            Ok(json) => {
                debug!("[Polymarket WS] Subscribing: {}", json);
                if let Err(e) = write.send(Message::Text(json.into())).await {
                    warn!("[Polymarket WS] Failed to send subscribe: {}", e);
                    return false;
                }
                true
            }
            Err(e) => {
                error!("[Polymarket WS] Failed to encode subscribe: {}", e);
                true
            }
        }
    }

    /// Main connection loop with reconnection logic.
    ///
    /// Waits for a subscription before connecting. After the reconnect budget
    /// is spent it goes back to waiting, so a later subscription retries.
    async fn connection_loop(
        config: FeedConfig,
        shared: Arc<FeedShared>,
        mut command_rx: mpsc::UnboundedReceiver<FeedCommand>,
    ) {
        loop {
            info!("[Polymarket WS] Waiting for subscriptions before connecting...");
            loop {
                match command_rx.recv().await {
                    Some(FeedCommand::Subscribe { asset_ids }) if !asset_ids.is_empty() => break,
                    Some(_) => {}
                    None => {
                        info!("[Polymarket WS] Command channel closed, exiting");
                        return;
                    }
                }
            }

            let mut reconnect_attempts = 0u32;

            loop {
                info!("[Polymarket WS] Connecting to {}", config.url);

                match connect_async(config.url.as_str()).await {
                    Ok((ws_stream, _)) => {
                        info!("[Polymarket WS] Connected successfully");
                        reconnect_attempts = 0;
                        shared.connected.store(true, Ordering::Relaxed);

                        let (mut write, mut read) = ws_stream.split();

                        // Covers the pending subscription as well as re-subscribes
                        let tokens = shared.tokens();
                        let mut alive = Self::send_subscribe(&mut write, tokens).await;

                        let mut ping_timer = interval(config.ping_interval);

                        while alive {
                            tokio::select! {
                                msg = read.next() => {
                                    match msg {
                                        Some(Ok(Message::Text(text))) => {
                                            for event in parse_feed_message(&text) {
                                                shared.dispatch(event);
                                            }
                                        }
                                        Some(Ok(Message::Ping(data))) => {
                                            if let Err(e) = write.send(Message::Pong(data)).await {
                                                warn!("[Polymarket WS] Failed to send pong: {}", e);
                                                alive = false;
                                            }
                                        }
                                        Some(Ok(Message::Close(_))) => {
                                            info!("[Polymarket WS] Connection closed by server");
                                            alive = false;
                                        }
                                        Some(Err(e)) => {
                                            error!("[Polymarket WS] Error: {}", e);
                                            alive = false;
                                        }
                                        None => {
                                            info!("[Polymarket WS] Stream ended");
                                            alive = false;
                                        }
                                        _ => {}
                                    }
                                }

                                cmd = command_rx.recv() => {
                                    match cmd {
                                        Some(FeedCommand::Subscribe { asset_ids }) => {
                                            alive = Self::send_subscribe(&mut write, asset_ids).await;
                                        }
                                        None => {
                                            info!("[Polymarket WS] Feed dropped, closing connection");
                                            let _ = write.send(Message::Close(None)).await;
                                            shared.connected.store(false, Ordering::Relaxed);
                                            return;
                                        }
                                    }
                                }

                                _ = ping_timer.tick() => {
                                    if let Err(e) = write.send(Message::Text("PING".into())).await {
                                        warn!("[Polymarket WS] Failed to send ping: {}", e);
                                        alive = false;
                                    }
                                }
                            }
                        }

                        shared.connected.store(false, Ordering::Relaxed);
                    }
                    Err(e) => {
                        error!("[Polymarket WS] Connection failed: {}", e);
                    }
                }

                if !config.auto_reconnect {
                    break;
                }

                reconnect_attempts += 1;
                if reconnect_attempts > config.max_reconnect_attempts {
                    error!("[Polymarket WS] Max reconnect attempts reached");
                    break;
                }

                let delay = reconnect_delay(reconnect_attempts);
                info!(
                    "[Polymarket WS] Reconnecting in {:?} (attempt {})",
                    delay, reconnect_attempts
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

impl std::fmt::Debug for MarketFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketFeed")
            .field("connected", &self.is_connected())
            .field("tokens", &self.subscribed_tokens())
            .finish()
    }
}
