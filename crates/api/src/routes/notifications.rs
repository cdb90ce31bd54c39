//! Notification webhook routes.
//!
//! Every handler answers 200 with a dispatch report; delivery problems are
//! reported in its `status` and per-recipient `outcomes`, not as HTTP errors.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};

use courier_notifier::orders::{
    CloseOrderReminderRequest, DateChangeRequest, MasterAssignedRequest, MasterReassignedRequest,
    ModernClosingReminderRequest, NewOrderRequest, OrderAcceptedRequest, OrderClosedRequest,
    OrderInModernRequest, OrderRejectionRequest,
};
use courier_notifier::{DispatchReport, RawEvent};

use crate::middleware::webhook::WebhookAuth;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/notifications/send", post(send))
        .route("/notifications/new-order", post(new_order))
        .route("/notifications/date-change", post(date_change))
        .route("/notifications/order-rejection", post(order_rejection))
        .route("/notifications/master-assigned", post(master_assigned))
        .route("/notifications/master-reassigned", post(master_reassigned))
        .route("/notifications/order-accepted", post(order_accepted))
        .route("/notifications/order-closed", post(order_closed))
        .route("/notifications/order-in-modern", post(order_in_modern))
        .route("/notifications/close-order-reminder", post(close_order_reminder))
        .route("/notifications/modern-closing-reminder", post(modern_closing_reminder))
}

/// POST /api/v1/notifications/send: dispatch an event given by kind name and payload map.
async fn send(
    State(state): State<AppState>,
    _auth: WebhookAuth,
    Json(raw): Json<RawEvent>,
) -> Json<DispatchReport> {
    Json(state.dispatcher.dispatch_raw(raw).await)
}

async fn new_order(
    State(state): State<AppState>,
    _auth: WebhookAuth,
    Json(req): Json<NewOrderRequest>,
) -> Json<DispatchReport> {
    tracing::info!(order_id = req.order_id, city = ?req.city, "New order notification");
    Json(state.notifications.new_order(req).await)
}

async fn date_change(
    State(state): State<AppState>,
    _auth: WebhookAuth,
    Json(req): Json<DateChangeRequest>,
) -> Json<DispatchReport> {
    Json(state.notifications.date_change(req).await)
}

async fn order_rejection(
    State(state): State<AppState>,
    _auth: WebhookAuth,
    Json(req): Json<OrderRejectionRequest>,
) -> Json<DispatchReport> {
    Json(state.notifications.order_rejection(req).await)
}

async fn master_assigned(
    State(state): State<AppState>,
    _auth: WebhookAuth,
    Json(req): Json<MasterAssignedRequest>,
) -> Json<DispatchReport> {
    Json(state.notifications.master_assigned(req).await)
}

/// POST /api/v1/notifications/master-reassigned: tell the previous master the order moved on.
async fn master_reassigned(
    State(state): State<AppState>,
    _auth: WebhookAuth,
    Json(req): Json<MasterReassignedRequest>,
) -> Json<DispatchReport> {
    Json(state.notifications.master_reassigned(req).await)
}

async fn order_accepted(
    State(state): State<AppState>,
    _auth: WebhookAuth,
    Json(req): Json<OrderAcceptedRequest>,
) -> Json<DispatchReport> {
    Json(state.notifications.order_accepted(req).await)
}

async fn order_closed(
    State(state): State<AppState>,
    _auth: WebhookAuth,
    Json(req): Json<OrderClosedRequest>,
) -> Json<DispatchReport> {
    Json(state.notifications.order_closed(req).await)
}

async fn order_in_modern(
    State(state): State<AppState>,
    _auth: WebhookAuth,
    Json(req): Json<OrderInModernRequest>,
) -> Json<DispatchReport> {
    Json(state.notifications.order_in_modern(req).await)
}

async fn close_order_reminder(
    State(state): State<AppState>,
    _auth: WebhookAuth,
    Json(req): Json<CloseOrderReminderRequest>,
) -> Json<DispatchReport> {
    Json(state.notifications.close_order_reminder(req).await)
}

async fn modern_closing_reminder(
    State(state): State<AppState>,
    _auth: WebhookAuth,
    Json(req): Json<ModernClosingReminderRequest>,
) -> Json<DispatchReport> {
    Json(state.notifications.modern_closing_reminder(req).await)
}
