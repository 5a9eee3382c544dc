//! API route definitions

mod analysis;
mod health;
mod markets;
pub mod proxy;
mod trading;
pub mod ws;

use axum::{
    extract::OriginalUri,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json, Router,
};
use polyperps_trading::TradingError;
use serde::Serialize;
use tracing::error;

use crate::AppState;

/// Error body returned by every endpoint
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

pub fn trading_status(err: &TradingError) -> StatusCode {
    match err {
        TradingError::InsufficientBalance { .. }
        | TradingError::InvalidOrder(_)
        | TradingError::InvalidInput(_)
        | TradingError::EmailTaken(_) => StatusCode::BAD_REQUEST,
        TradingError::InvalidCredentials | TradingError::SessionNotFound => StatusCode::UNAUTHORIZED,
        TradingError::PositionNotFound(_)
        | TradingError::OrderNotFound(_)
        | TradingError::AccountNotFound(_)
        | TradingError::KeyNotFound => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Map a trading error to its HTTP response. Server-side failures are
/// logged and their details withheld from the client.
pub fn trading_error_response(err: TradingError) -> Response {
    let status = trading_status(&err);
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!("Trading request failed: {}", err);
        return error_response(status, "Internal server error");
    }
    error_response(status, err.to_string())
}

/// Unknown `/api/*` paths get a JSON 404 instead of the frontend
async fn api_not_found(OriginalUri(uri): OriginalUri) -> Response {
    error_response(StatusCode::NOT_FOUND, format!("No API route for {}", uri.path()))
}

/// Create all API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(health::routes())
        .merge(markets::routes())
        .merge(trading::routes())
        .merge(analysis::routes())
        .fallback(api_not_found)
}

/// Create WebSocket routes (separate from API)
pub fn ws_routes() -> Router<AppState> {
    ws::routes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_trading_status_mapping() {
        let cases = [
            (
                TradingError::InsufficientBalance {
                    required: Decimal::ONE,
                    available: Decimal::ZERO,
                },
                StatusCode::BAD_REQUEST,
            ),
            (TradingError::InvalidOrder("x".into()), StatusCode::BAD_REQUEST),
            (TradingError::EmailTaken("a@b.co".into()), StatusCode::BAD_REQUEST),
            (TradingError::InvalidCredentials, StatusCode::UNAUTHORIZED),
            (TradingError::SessionNotFound, StatusCode::UNAUTHORIZED),
            (TradingError::PositionNotFound("p".into()), StatusCode::NOT_FOUND),
            (TradingError::OrderNotFound("o".into()), StatusCode::NOT_FOUND),
            (TradingError::KeyNotFound, StatusCode::NOT_FOUND),
            (TradingError::Storage("disk".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, status) in cases {
            assert_eq!(trading_status(&err), status, "{}", err);
        }
    }
}
