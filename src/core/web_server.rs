//! HTTP server: withdraw API, health and Prometheus metrics.
//!
//! Runs on PORT (default 3000). In webhook mode the Telegram update route is
//! merged into the same router.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::core::amount::{AmountError, Doge};
use crate::core::error::WithdrawError;
use crate::core::metrics;
use crate::withdraw::{WithdrawalRequest, WithdrawalService};

/// Shared state for the web server.
#[derive(Clone)]
pub struct ApiState {
    withdrawals: Arc<WithdrawalService>,
    api_key: Option<Arc<str>>,
}

impl ApiState {
    pub fn new(withdrawals: Arc<WithdrawalService>, api_key: Option<String>) -> Self {
        Self {
            withdrawals,
            api_key: api_key.map(Arc::from),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WithdrawBody {
    user_id: i64,
    address: String,
    /// Decimal string or JSON number of DOGE
    amount: Value,
    #[serde(default)]
    request_id: Option<String>,
}

/// Builds the router without binding, so callers can merge more routes.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/api/withdraw", post(withdraw_handler))
        .with_state(state)
}

/// Serves `app` until the listener fails.
pub async fn serve(listener: TcpListener, app: Router) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        log::info!("Starting web server on http://{}", addr);
    }
    log::info!("  /              - Liveness text");
    log::info!("  /health        - Health check");
    log::info!("  /metrics       - Prometheus metrics");
    log::info!("  /api/withdraw  - Withdraw DOGE (POST)");
    axum::serve(listener, app).await
}

/// Binds 0.0.0.0:`port` and serves `app`.
pub async fn start_web_server(port: u16, app: Router) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(&addr).await?;
    serve(listener, app).await
}

async fn root_handler() -> &'static str {
    "Bot is running"
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

async fn metrics_handler() -> Response {
    match metrics::render() {
        Ok((content_type, body)) => ([(axum::http::header::CONTENT_TYPE, content_type)], body).into_response(),
        Err(e) => {
            log::error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Failed to encode metrics: {}", e)).into_response()
        }
    }
}

fn parse_amount(raw: &Value) -> Result<Doge, AmountError> {
    match raw {
        Value::String(text) => text.parse(),
        Value::Number(number) => number.to_string().parse(),
        other => Err(AmountError::Malformed(other.to_string())),
    }
}

/// HTTP status for each withdrawal failure.
pub fn status_for(err: &WithdrawError) -> StatusCode {
    match err {
        WithdrawError::InvalidAddress(_)
        | WithdrawError::InvalidAmount(_)
        | WithdrawError::BelowMinimum { .. }
        | WithdrawError::UnknownUser(_) => StatusCode::BAD_REQUEST,
        WithdrawError::InsufficientUserBalance { .. } | WithdrawError::InsufficientHouseBalance { .. } => {
            StatusCode::PAYMENT_REQUIRED
        }
        WithdrawError::InProgress(_) | WithdrawError::DuplicateRequest(_) => StatusCode::CONFLICT,
        WithdrawError::Cooldown(_) => StatusCode::TOO_MANY_REQUESTS,
        WithdrawError::Network(_) | WithdrawError::ApiRejected(_) | WithdrawError::BroadcastUnknown { .. } => {
            StatusCode::BAD_GATEWAY
        }
        WithdrawError::MissingCredential(_) | WithdrawError::InvalidPrivateKey(_) => StatusCode::SERVICE_UNAVAILABLE,
        WithdrawError::Signing(_) | WithdrawError::Ledger(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn failure(status: StatusCode, code: &str, message: String) -> Response {
    (
        status,
        Json(json!({
            "success": false,
            "message": message,
            "code": code,
        })),
    )
        .into_response()
}

fn authorized(headers: &HeaderMap, expected: &str) -> bool {
    let bearer = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);
    let api_key = headers.get("x-api-key").and_then(|v| v.to_str().ok()).map(str::trim);
    bearer == Some(expected) || api_key == Some(expected)
}

/// POST /api/withdraw
async fn withdraw_handler(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Result<Json<WithdrawBody>, JsonRejection>,
) -> Response {
    if let Some(expected) = &state.api_key {
        if !authorized(&headers, expected) {
            log::warn!("🚫 Rejected /api/withdraw call without a valid API key");
            return failure(StatusCode::UNAUTHORIZED, "unauthorized", "invalid API key".to_string());
        }
    }

    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return failure(StatusCode::BAD_REQUEST, "invalid_request", rejection.body_text()),
    };

    let amount = match parse_amount(&body.amount) {
        Ok(amount) => amount,
        Err(e) => {
            let err = WithdrawError::from(e);
            return failure(status_for(&err), err.kind(), err.to_string());
        }
    };

    let header_key = headers
        .get("idempotency-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let request_key = body
        .request_id
        .or(header_key)
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let request = WithdrawalRequest {
        user_id: body.user_id,
        address: body.address,
        amount,
        request_key,
    };

    match state.withdrawals.process(request).await {
        Ok(receipt) => Json(json!({
            "success": true,
            "txHash": receipt.tx_hash,
            "withdrawalId": receipt.withdrawal_id,
            "replayed": receipt.replayed,
        }))
        .into_response(),
        Err(err) => failure(status_for(&err), err.kind(), err.to_string()),
    }
}
