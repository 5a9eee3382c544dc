//! Account and paper-trading endpoints
//!
//! Every route except `/quote` needs `Authorization: Bearer <token>` from one
//! of the `/auth/*` endpoints. Account calls block on SQLite and password
//! hashing, so they run on the blocking pool.

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use polyperps_core::{Account, LimitOrder, Position, Side, TradeRecord};
use polyperps_trading::{
    position_pnl,
    risk::{
        self, distance_to_liquidation, funding_estimate, is_near_liquidation, mark_price, roi_percent,
    },
    AccountService, CloseOutcome, OrderQuote, SignIn, TradeRequest, LEVERAGE_OPTIONS, MAX_LEVERAGE,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};

use super::{error_response, trading_error_response};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub account: Account,
}

impl From<SignIn> for SessionResponse {
    fn from(signed_in: SignIn) -> Self {
        Self {
            token: signed_in.token,
            account: signed_in.account,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub success: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExportKeyRequest {
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportKeyResponse {
    pub wallet_address: String,
    pub private_key: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateBalanceRequest {
    pub balance: Decimal,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioResponse {
    pub account: Account,
    pub positions: Vec<Position>,
    pub orders: Vec<LimitOrder>,
    pub margin_in_use: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosePositionRequest {
    pub current_price: Decimal,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosePositionResponse {
    #[serde(flatten)]
    pub outcome: CloseOutcome,
    pub balance: Decimal,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceChange<T> {
    #[serde(flatten)]
    pub item: T,
    pub balance: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct QuoteRequest {
    pub side: Side,
    pub size: Decimal,
    pub leverage: Decimal,
    pub price: Decimal,
}

/// A quote plus the leverage presets the ticket offers
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResponse {
    #[serde(flatten)]
    pub quote: OrderQuote,
    pub leverage_options: &'static [u32],
    pub max_leverage: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct PnlRequest {
    /// Current YES price keyed by market id
    #[serde(default)]
    pub prices: HashMap<String, Decimal>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionPnl {
    pub id: String,
    pub market_id: String,
    pub current_price: Decimal,
    pub pnl: Decimal,
    pub roi: Decimal,
    pub distance_to_liquidation: Decimal,
    pub near_liquidation: bool,
    /// Display-only, never charged
    pub funding_per_day: Decimal,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PnlResponse {
    pub positions: Vec<PositionPnl>,
    pub total_pnl: Decimal,
}

// ============================================================================
// Helpers
// ============================================================================

fn bearer_token(headers: &HeaderMap) -> Result<String, Response> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| error_response(StatusCode::UNAUTHORIZED, "Missing bearer token"))
}

/// Run an account call on the blocking pool
async fn blocking<T, F>(accounts: &Arc<AccountService>, f: F) -> Result<T, Response>
where
    F: FnOnce(&AccountService) -> polyperps_trading::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let accounts = Arc::clone(accounts);
    match tokio::task::spawn_blocking(move || f(&accounts)).await {
        Ok(result) => result.map_err(trading_error_response),
        Err(e) => {
            error!("Account task failed: {}", e);
            Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
            ))
        }
    }
}

fn position_pnl_view(position: &Position, prices: &HashMap<String, Decimal>) -> PositionPnl {
    let current_price = mark_price(prices.get(&position.market_id).copied(), position.entry_price);
    let pnl = position_pnl(position, current_price);
    PositionPnl {
        id: position.id.clone(),
        market_id: position.market_id.clone(),
        current_price,
        pnl,
        roi: roi_percent(pnl, position.margin),
        distance_to_liquidation: distance_to_liquidation(position, current_price),
        near_liquidation: is_near_liquidation(position, current_price),
        funding_per_day: funding_estimate(position.size, Decimal::from(24)),
    }
}

// ============================================================================
// Auth
// ============================================================================

async fn register(
    State(state): State<AppState>,
    Json(req): Json<CredentialsRequest>,
) -> Result<Json<SessionResponse>, Response> {
    let signed_in = blocking(&state.accounts, move |accounts| {
        accounts.register(&req.email, &req.password)
    })
    .await?;
    Ok(Json(signed_in.into()))
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<CredentialsRequest>,
) -> Result<Json<SessionResponse>, Response> {
    let signed_in = blocking(&state.accounts, move |accounts| {
        accounts.login(&req.email, &req.password)
    })
    .await?;
    Ok(Json(signed_in.into()))
}

async fn connect_wallet(State(state): State<AppState>) -> Result<Json<SessionResponse>, Response> {
    let signed_in = blocking(&state.accounts, |accounts| accounts.connect_wallet()).await?;
    Ok(Json(signed_in.into()))
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<LogoutResponse>, Response> {
    let token = bearer_token(&headers)?;
    Ok(Json(LogoutResponse {
        success: state.accounts.logout(&token),
    }))
}

// ============================================================================
// Account
// ============================================================================

async fn get_account(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Account>, Response> {
    let token = bearer_token(&headers)?;
    let account = blocking(&state.accounts, move |accounts| accounts.account(&token)).await?;
    Ok(Json(account))
}

async fn update_balance(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<UpdateBalanceRequest>,
) -> Result<Json<Account>, Response> {
    let token = bearer_token(&headers)?;
    let account = blocking(&state.accounts, move |accounts| {
        accounts.update_balance(&token, req.balance)
    })
    .await?;
    info!("Balance for {} set to {}", account.id, account.balance);
    Ok(Json(account))
}

async fn export_key(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<ExportKeyRequest>>,
) -> Result<Json<ExportKeyResponse>, Response> {
    let token = bearer_token(&headers)?;
    let password = body.map(|Json(req)| req).unwrap_or_default().password;

    let (account, private_key) = blocking(&state.accounts, move |accounts| {
        let key = accounts.export_private_key(&token, password.as_deref())?;
        Ok((accounts.account(&token)?, key))
    })
    .await?;

    Ok(Json(ExportKeyResponse {
        wallet_address: account.wallet_address,
        private_key,
    }))
}

// ============================================================================
// Positions & Orders
// ============================================================================

async fn get_positions(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<PortfolioResponse>, Response> {
    let token = bearer_token(&headers)?;
    let (account, portfolio) = blocking(&state.accounts, move |accounts| accounts.portfolio(&token)).await?;

    Ok(Json(PortfolioResponse {
        account,
        margin_in_use: portfolio.margin_in_use(),
        positions: portfolio.positions,
        orders: portfolio.orders,
    }))
}

async fn open_position(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<TradeRequest>,
) -> Result<Json<BalanceChange<Position>>, Response> {
    let token = bearer_token(&headers)?;
    let (position, balance) = blocking(&state.accounts, move |accounts| {
        let position = accounts.open_position(&token, &req)?;
        Ok((position, accounts.account(&token)?.balance))
    })
    .await?;

    info!(
        "Opened {} {}x {} on {} at {}",
        position.side, position.leverage, position.size, position.market_id, position.entry_price
    );
    Ok(Json(BalanceChange { item: position, balance }))
}

async fn close_position(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(position_id): Path<String>,
    Json(req): Json<ClosePositionRequest>,
) -> Result<Json<ClosePositionResponse>, Response> {
    let token = bearer_token(&headers)?;
    let (outcome, balance) = blocking(&state.accounts, move |accounts| {
        let outcome = accounts.close_position(&token, &position_id, req.current_price)?;
        Ok((outcome, accounts.account(&token)?.balance))
    })
    .await?;

    info!("Closed {} with pnl {}", outcome.position_id, outcome.pnl);
    Ok(Json(ClosePositionResponse { outcome, balance }))
}

async fn place_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<TradeRequest>,
) -> Result<Json<BalanceChange<LimitOrder>>, Response> {
    let token = bearer_token(&headers)?;
    let (order, balance) = blocking(&state.accounts, move |accounts| {
        let order = accounts.place_limit_order(&token, &req)?;
        Ok((order, accounts.account(&token)?.balance))
    })
    .await?;

    Ok(Json(BalanceChange { item: order, balance }))
}

async fn cancel_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(order_id): Path<String>,
) -> Result<Json<BalanceChange<LimitOrder>>, Response> {
    let token = bearer_token(&headers)?;
    let (order, balance) = blocking(&state.accounts, move |accounts| {
        let order = accounts.cancel_order(&token, &order_id)?;
        Ok((order, accounts.account(&token)?.balance))
    })
    .await?;

    info!("Cancelled order {}", order.id);
    Ok(Json(BalanceChange { item: order, balance }))
}

async fn get_history(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<TradeRecord>>, Response> {
    let token = bearer_token(&headers)?;
    let (_, portfolio) = blocking(&state.accounts, move |accounts| accounts.portfolio(&token)).await?;
    Ok(Json(portfolio.history))
}

async fn positions_pnl(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<PnlRequest>,
) -> Result<Json<PnlResponse>, Response> {
    let token = bearer_token(&headers)?;
    let (_, portfolio) = blocking(&state.accounts, move |accounts| accounts.portfolio(&token)).await?;

    let positions = portfolio
        .positions
        .iter()
        .map(|p| position_pnl_view(p, &req.prices))
        .collect();

    Ok(Json(PnlResponse {
        positions,
        total_pnl: portfolio.total_unrealized_pnl(&req.prices),
    }))
}

/// Preview an order ticket. Needs no session.
async fn quote_order(Json(req): Json<QuoteRequest>) -> Response {
    match risk::quote(req.side, req.size, req.leverage, req.price) {
        Ok(quote) => Json(QuoteResponse {
            quote,
            leverage_options: &LEVERAGE_OPTIONS,
            max_leverage: MAX_LEVERAGE,
        })
        .into_response(),
        Err(e) => trading_error_response(e),
    }
}

/// Create trading routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/wallet", post(connect_wallet))
        .route("/auth/logout", post(logout))
        .route("/account", get(get_account))
        .route("/account/balance", put(update_balance))
        .route("/account/export-key", post(export_key))
        .route("/positions", get(get_positions).post(open_position))
        .route("/positions/pnl", post(positions_pnl))
        .route("/positions/{id}/close", post(close_position))
        .route("/orders", post(place_order))
        .route("/orders/{id}", delete(cancel_order))
        .route("/history", get(get_history))
        .route("/quote", post(quote_order))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn position(side: Side, entry: Decimal) -> Position {
        Position {
            id: "pos-1".to_string(),
            market_id: "m1".to_string(),
            market_question: "Q?".to_string(),
            market_slug: "q".to_string(),
            side,
            size: dec!(1000),
            leverage: dec!(10),
            entry_price: entry,
            margin: dec!(100),
            liquidation_price: risk::liquidation_price(entry, dec!(10), side),
            opened_at: Utc::now(),
        }
    }

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_err());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(bearer_token(&headers).is_err());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer  "));
        assert!(bearer_token(&headers).is_err());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
        assert_eq!(bearer_token(&headers).unwrap(), "abc123");
    }

    #[test]
    fn test_position_pnl_view() {
        let position = position(Side::Yes, dec!(0.50));
        let mut prices = HashMap::new();

        // No price: marked at entry
        let view = position_pnl_view(&position, &prices);
        assert_eq!(view.current_price, dec!(0.50));
        assert_eq!(view.pnl, dec!(0));

        prices.insert("m1".to_string(), dec!(0.48));
        let view = position_pnl_view(&position, &prices);
        assert_eq!(view.pnl, dec!(-200));
        assert_eq!(view.roi, dec!(-200));
        // liquidation at 0.45
        assert_eq!(view.distance_to_liquidation, dec!(0.03));
        assert!(view.near_liquidation);
        assert_eq!(view.funding_per_day, dec!(0.3));

        // Quotes outside the unit interval are ignored rather than overflowing
        prices.insert("m1".to_string(), Decimal::MAX);
        let view = position_pnl_view(&position, &prices);
        assert_eq!(view.current_price, dec!(0.50));
        assert_eq!(view.pnl, dec!(0));
    }
}
