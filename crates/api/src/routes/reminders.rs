//! On-demand reminder pass triggers.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};

use courier_common::error::AppError;

use crate::middleware::webhook::WebhookAuth;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/reminders/close-orders", post(close_orders))
        .route("/reminders/modern-orders", post(modern_orders))
        .route("/reminders/test", post(run_all))
}

fn pass_failed(e: anyhow::Error) -> AppError {
    AppError::Internal(format!("Reminder pass failed: {}", e))
}

/// POST /api/v1/reminders/close-orders: run the close-order pass now.
async fn close_orders(
    State(state): State<AppState>,
    _auth: WebhookAuth,
) -> Result<Json<Value>, AppError> {
    let summary = state
        .scheduler
        .run_close_order_pass()
        .await
        .map_err(pass_failed)?;
    Ok(Json(json!({ "success": true, "closeOrders": summary })))
}

/// POST /api/v1/reminders/modern-orders: run the modern-closing pass now.
async fn modern_orders(
    State(state): State<AppState>,
    _auth: WebhookAuth,
) -> Result<Json<Value>, AppError> {
    let summary = state
        .scheduler
        .run_modern_closing_pass()
        .await
        .map_err(pass_failed)?;
    Ok(Json(json!({ "success": true, "modernOrders": summary })))
}

/// POST /api/v1/reminders/test: run both passes, close-order first.
async fn run_all(
    State(state): State<AppState>,
    _auth: WebhookAuth,
) -> Result<Json<Value>, AppError> {
    let close_orders = state
        .scheduler
        .run_close_order_pass()
        .await
        .map_err(pass_failed)?;
    let modern_orders = state
        .scheduler
        .run_modern_closing_pass()
        .await
        .map_err(pass_failed)?;
    Ok(Json(json!({
        "success": true,
        "message": "Reminder jobs executed",
        "closeOrders": close_orders,
        "modernOrders": modern_orders,
    })))
}
