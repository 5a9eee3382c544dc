//! WebSocket relay for live market updates
//!
//! Browsers subscribe by token id and receive the upstream feed's price and
//! book events as JSON. All clients share one upstream connection.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use polyperps_polymarket::FeedSubscription;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::AppState;

const MAX_SUBSCRIPTIONS_PER_CLIENT: usize = 50;

/// Messages sent by the browser
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ClientMessage {
    Subscribe {
        #[serde(rename = "tokenId")]
        token_id: String,
    },
    Unsubscribe {
        #[serde(rename = "tokenId")]
        token_id: String,
    },
}

/// Control replies. Feed events are sent as they come from the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Subscribed {
        #[serde(rename = "tokenId")]
        token_id: String,
        /// False for mock tokens, which never receive updates
        live: bool,
    },
    Unsubscribed {
        #[serde(rename = "tokenId")]
        token_id: String,
    },
    Error {
        message: String,
    },
}

impl ServerMessage {
    fn to_json(&self) -> Option<String> {
        serde_json::to_string(self)
            .map_err(|e| error!("Failed to serialize message: {}", e))
            .ok()
    }
}

/// Create WebSocket routes
pub fn routes() -> Router<AppState> {
    Router::new().route("/ws", get(ws_handler))
}

/// WebSocket upgrade handler
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    debug!("WebSocket upgrade request received");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

fn spawn_forwarder(mut subscription: FeedSubscription, out: mpsc::Sender<String>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = subscription.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(j) => j,
                Err(e) => {
                    error!("Failed to serialize feed event: {}", e);
                    continue;
                }
            };
            if out.send(json).await.is_err() {
                break;
            }
        }
    })
}

/// Per-connection subscription set. Dropping a forwarder drops its feed
/// handle, which releases the token upstream.
struct ClientSubscriptions {
    forwarders: HashMap<String, JoinHandle<()>>,
    out: mpsc::Sender<String>,
}

impl ClientSubscriptions {
    fn handle(&mut self, state: &AppState, message: ClientMessage) -> ServerMessage {
        match message {
            ClientMessage::Subscribe { token_id } => {
                let token_id = token_id.trim().to_string();
                if self.forwarders.contains_key(&token_id) {
                    return ServerMessage::Subscribed { token_id, live: true };
                }
                if self.forwarders.len() >= MAX_SUBSCRIPTIONS_PER_CLIENT {
                    return ServerMessage::Error {
                        message: format!(
                            "Too many subscriptions (max {})",
                            MAX_SUBSCRIPTIONS_PER_CLIENT
                        ),
                    };
                }

                match state.feed.subscribe(&token_id) {
                    Some(subscription) => {
                        let task = spawn_forwarder(subscription, self.out.clone());
                        self.forwarders.insert(token_id.clone(), task);
                        ServerMessage::Subscribed { token_id, live: true }
                    }
                    None => ServerMessage::Subscribed { token_id, live: false },
                }
            }
            ClientMessage::Unsubscribe { token_id } => {
                let token_id = token_id.trim().to_string();
                if let Some(task) = self.forwarders.remove(&token_id) {
                    task.abort();
                }
                ServerMessage::Unsubscribed { token_id }
            }
        }
    }

    fn clear(&mut self) {
        for (_, task) in self.forwarders.drain() {
            task.abort();
        }
    }
}

/// Handle an established WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    info!("WebSocket client connected");
    let (mut sender, mut receiver) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<String>(256);

    // Task: Send outgoing messages to WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let mut subscriptions = ClientSubscriptions {
        forwarders: HashMap::new(),
        out: out_tx.clone(),
    };

    while let Some(Ok(msg)) = receiver.next().await {
        let reply = match msg {
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(text.as_str()) {
                Ok(message) => subscriptions.handle(&state, message),
                Err(e) => ServerMessage::Error {
                    message: format!("Invalid message: {}", e),
                },
            },
            Message::Close(_) => break,
            _ => continue,
        };

        if let Some(json) = reply.to_json() {
            if out_tx.send(json).await.is_err() {
                break;
            }
        }
    }

    subscriptions.clear();
    send_task.abort();
    info!("WebSocket client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_client_message() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"action":"subscribe","tokenId":"123"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Subscribe {
                token_id: "123".to_string()
            }
        );

        let msg: ClientMessage =
            serde_json::from_str(r#"{"action":"unsubscribe","tokenId":"123"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Unsubscribe { .. }));

        assert!(serde_json::from_str::<ClientMessage>(r#"{"action":"ping"}"#).is_err());
        assert!(serde_json::from_str::<ClientMessage>(r#"{"action":"subscribe"}"#).is_err());
    }

    #[test]
    fn test_server_message_shape() {
        let json = ServerMessage::Subscribed {
            token_id: "mock-yes-1".to_string(),
            live: false,
        }
        .to_json()
        .unwrap();
        assert_eq!(json, r#"{"type":"subscribed","tokenId":"mock-yes-1","live":false}"#);

        let json = ServerMessage::Error {
            message: "bad".to_string(),
        }
        .to_json()
        .unwrap();
        assert_eq!(json, r#"{"type":"error","message":"bad"}"#);
    }
}
