//! Sentiment Routes
//!
//! `GET /sentiment?ticker=..&days=..` runs one pipeline pass and returns the
//! report; `GET /` identifies the service.

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use sentiment_core::SentimentReport;
use sentiment_orchestrator::{Disposition, PipelineError, MAX_DAYS};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::AppState;

const DEFAULT_DAYS: i64 = 7;
const EXAMPLE_QUERY: &str = "/sentiment?ticker=AAPL&days=7";

/// Both fields arrive as text so malformed values get our own 400 body
/// instead of the extractor's plain-text rejection.
#[derive(Debug, Default, Deserialize)]
pub struct SentimentQuery {
    #[serde(default)]
    pub ticker: Option<String>,
    #[serde(default)]
    pub days: Option<String>,
}

pub fn sentiment_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/sentiment", get(get_sentiment))
}

async fn root() -> Json<Value> {
    Json(json!({ "message": "Financial Sentiment Analysis API" }))
}

async fn get_sentiment(
    State(state): State<AppState>,
    query: Result<Query<SentimentQuery>, QueryRejection>,
) -> Result<Json<SentimentReport>, AppError> {
    let Query(query) = query.map_err(|e| AppError::bad_query(e.body_text()))?;

    let ticker = query.ticker.unwrap_or_default();
    let days = match query.days.as_deref().map(str::trim) {
        None | Some("") => DEFAULT_DAYS,
        Some(raw) => raw.parse::<i64>().map_err(|_| AppError::invalid_days(raw))?,
    };

    let report = state
        .pipeline
        .analyze(&ticker, days)
        .await
        .map_err(|e| AppError::from_pipeline(e, &ticker, days))?;

    Ok(Json(report))
}

/// An error response with one of three body shapes.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    body: Value,
}

impl AppError {
    fn bad_query(reason: String) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: json!({
                "error": "Invalid query",
                "message": reason,
                "example": EXAMPLE_QUERY,
            }),
        }
    }

    fn invalid_days(raw: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: json!({
                "error": "Invalid days parameter",
                "message": format!("days must be a whole number between 1 and {MAX_DAYS}, got '{raw}'"),
                "example": EXAMPLE_QUERY,
            }),
        }
    }

    fn from_pipeline(err: PipelineError, raw_ticker: &str, days: i64) -> Self {
        let ticker = raw_ticker.trim().to_uppercase();
        match (err.disposition(), &err) {
            (Disposition::BadRequest, PipelineError::InvalidDays(_)) => Self {
                status: StatusCode::BAD_REQUEST,
                body: json!({
                    "error": "Invalid days parameter",
                    "message": err.to_string(),
                    "example": EXAMPLE_QUERY,
                }),
            },
            (Disposition::BadRequest, _) => Self {
                status: StatusCode::BAD_REQUEST,
                body: json!({
                    "error": "Invalid ticker format",
                    "message": "Please provide a valid stock ticker symbol (e.g., AAPL, MSFT, TSLA)",
                    "example": EXAMPLE_QUERY,
                }),
            },
            (Disposition::NotFound, _) => {
                tracing::warn!("News lookup for {} failed: {}", ticker, err);
                Self {
                    status: StatusCode::NOT_FOUND,
                    body: json!({
                        "error": "API request failed",
                        "message": format!(
                            "Could not retrieve news for ticker {ticker}. The ticker may not exist or there could be an issue with the API."
                        ),
                        "details": err.to_string(),
                    }),
                }
            }
            (Disposition::Internal, _) => {
                tracing::error!("Sentiment request for {} ({} days) failed: {}", ticker, days, err);
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    body: json!({
                        "error": "Internal server error",
                        "message": "An unexpected error occurred while processing your request.",
                        "ticker": ticker,
                        "days": days,
                    }),
                }
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
