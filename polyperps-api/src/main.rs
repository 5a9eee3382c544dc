//! PolyPerps API Server
//!
//! Serves the built terminal frontend, proxies the Polymarket APIs, relays the
//! live market feed and hosts the paper-trading ledger.

mod config;
mod routes;

use axum::{
    http::{header, Method},
    Router,
};
use polyperps_polymarket::{FeedConfig, MarketDataService, MarketFeed, PolymarketClient};
use polyperps_research::OpenAIClient;
use polyperps_trading::{AccountService, AccountStore};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::ServerConfig;

const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub market_data: Arc<MarketDataService>,
    pub accounts: Arc<AccountService>,
    pub feed: Arc<MarketFeed>,
    /// AI analysis client (optional - requires OPENAI_API_KEY)
    pub analyst: Option<Arc<OpenAIClient>>,
    /// Client used by the pass-through proxy
    pub http: reqwest::Client,
}

impl AppState {
    /// Build every service from config. Must run inside a Tokio runtime.
    pub fn from_config(config: ServerConfig) -> anyhow::Result<Self> {
        let client = PolymarketClient::with_urls(&config.gamma_api_url, &config.clob_api_url)?;

        info!("Opening account database at: {}", config.database_path.display());
        let store = AccountStore::new(&config.database_path)?;
        let accounts = AccountService::new(Arc::new(store), config.starting_balance);

        let feed = MarketFeed::spawn(FeedConfig {
            url: config.ws_url.clone(),
            ..FeedConfig::default()
        });

        let analyst = match config.openai_api_key.as_deref() {
            Some(key) => {
                let client = OpenAIClient::new(key, config.openai_base_url.as_deref())
                    .with_model(&config.openai_model);
                info!("AI analysis enabled with model {}", client.model());
                Some(Arc::new(client))
            }
            None => {
                info!("AI analysis not available. Set OPENAI_API_KEY to enable.");
                None
            }
        };

        let http = reqwest::Client::builder().timeout(UPSTREAM_TIMEOUT).build()?;

        Ok(Self {
            config: Arc::new(config),
            market_data: Arc::new(MarketDataService::new(client)),
            accounts: Arc::new(accounts),
            feed: Arc::new(feed),
            analyst,
            http,
        })
    }
}

/// Full application router: API, proxy, WebSocket relay and static frontend
pub fn app(state: AppState) -> Router {
    // Configure CORS for frontend
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    // SPA fallback - unknown paths get index.html
    let static_dir = &state.config.static_dir;
    let frontend = ServeDir::new(static_dir).fallback(ServeFile::new(static_dir.join("index.html")));

    Router::new()
        .nest("/api", routes::api_routes())
        .merge(routes::proxy::routes())
        .merge(routes::ws_routes())
        .fallback_service(frontend)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables, .env.local taking precedence
    for file in [".env.local", ".env"] {
        if let Err(e) = dotenvy::from_filename(file) {
            // Not an error if the file doesn't exist
            if !e.not_found() {
                eprintln!("Warning: Failed to load {}: {}", file, e);
            }
        }
    }

    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,polyperps_api=debug")),
        )
        .init();

    info!("Starting PolyPerps API");

    let config = ServerConfig::from_env()?;
    let port = config.port;
    let state = AppState::from_config(config)?;

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
