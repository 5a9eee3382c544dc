//! AI market analysis endpoint

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use tracing::{info, warn};

use super::error_response;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    pub question: String,
    /// YES price, 0-1
    pub current_price: f64,
}

async fn ai_analysis(State(state): State<AppState>, Json(req): Json<AnalysisRequest>) -> Response {
    let Some(analyst) = state.analyst.as_ref() else {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "AI analysis is not configured. Set OPENAI_API_KEY to enable it.",
        );
    };

    let question = req.question.trim();
    if question.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "question must not be empty");
    }

    info!("AI analysis requested for: {}", question);
    match analyst.analyze(question, req.current_price).await {
        Ok(analysis) => Json(analysis).into_response(),
        Err(e) => {
            warn!("AI analysis failed: {}", e);
            error_response(StatusCode::BAD_GATEWAY, format!("Analysis failed: {}", e))
        }
    }
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/ai-analysis", post(ai_analysis))
}
