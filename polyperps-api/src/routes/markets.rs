//! Market data endpoints
//!
//! These never fail because of Polymarket: every handler falls back to mock
//! data the same way the market data service does.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use polyperps_core::{Market, Spread, Timeframe};
use polyperps_polymarket::client::DEFAULT_MARKET_LIMIT;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::error_response;
use crate::AppState;

const MAX_MARKET_LIMIT: u32 = 500;

/// Query parameters for listing markets
#[derive(Debug, Deserialize)]
pub struct ListMarketsQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// Response for listing markets
#[derive(Debug, Serialize)]
pub struct MarketsResponse {
    pub markets: Vec<Market>,
    pub count: usize,
}

/// Query parameters for order book and history
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookQuery {
    /// Centre of the mock book if no live book is available
    pub base_price: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceHistoryQuery {
    /// Chart timeframe preset (1h, 6h, 1d, 1w, max)
    pub timeframe: Option<String>,
    /// Raw `/prices-history` interval, overrides the preset
    pub interval: Option<String>,
    /// Minutes per point, used with `interval`
    pub fidelity: Option<u32>,
    pub base_price: Option<Decimal>,
}

#[derive(Debug, Serialize)]
pub struct SpreadResponse {
    pub spread: Option<Spread>,
}

#[derive(Debug, Serialize)]
pub struct MidpointResponse {
    pub midpoint: Option<Decimal>,
}

/// Mock data is centred on the market's last traded price; fall back to an
/// even market when the client does not send one
fn base_price(value: Option<Decimal>) -> Decimal {
    value
        .filter(|p| *p > Decimal::ZERO && *p < Decimal::ONE)
        .unwrap_or(Decimal::new(5, 1))
}

/// Create market routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/markets", get(list_markets))
        .route("/markets/{token_id}/book", get(get_order_book))
        .route("/markets/{token_id}/history", get(get_price_history))
        .route("/markets/{token_id}/spread", get(get_spread))
        .route("/markets/{token_id}/midpoint", get(get_midpoint))
}

/// Active markets sorted by volume
async fn list_markets(
    State(state): State<AppState>,
    Query(params): Query<ListMarketsQuery>,
) -> Json<MarketsResponse> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_MARKET_LIMIT)
        .clamp(1, MAX_MARKET_LIMIT);
    let offset = params.offset.unwrap_or(0);

    let markets = state.market_data.fetch_markets(limit, offset).await;
    let count = markets.len();
    info!("Returning {} markets", count);

    Json(MarketsResponse { markets, count })
}

async fn get_order_book(
    State(state): State<AppState>,
    Path(token_id): Path<String>,
    Query(params): Query<BookQuery>,
) -> Response {
    let book = state
        .market_data
        .fetch_order_book(&token_id, base_price(params.base_price))
        .await;
    Json(book).into_response()
}

async fn get_price_history(
    State(state): State<AppState>,
    Path(token_id): Path<String>,
    Query(params): Query<PriceHistoryQuery>,
) -> Response {
    let base = base_price(params.base_price);

    let history = match params.interval.as_deref() {
        Some(interval) => {
            let fidelity = params.fidelity.unwrap_or(Timeframe::default().fidelity());
            state
                .market_data
                .fetch_price_history_with(&token_id, interval, fidelity, base)
                .await
        }
        None => {
            let timeframe = match params.timeframe.as_deref() {
                Some(raw) => match raw.parse::<Timeframe>() {
                    Ok(tf) => tf,
                    Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
                },
                None => Timeframe::default(),
            };
            state
                .market_data
                .fetch_price_history(&token_id, timeframe, base)
                .await
        }
    };

    Json(history).into_response()
}

async fn get_spread(
    State(state): State<AppState>,
    Path(token_id): Path<String>,
) -> Json<SpreadResponse> {
    Json(SpreadResponse {
        spread: state.market_data.fetch_spread(&token_id).await,
    })
}

async fn get_midpoint(
    State(state): State<AppState>,
    Path(token_id): Path<String>,
) -> Json<MidpointResponse> {
    Json(MidpointResponse {
        midpoint: state.market_data.fetch_midpoint(&token_id).await,
    })
}
