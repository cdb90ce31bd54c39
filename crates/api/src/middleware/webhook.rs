//! Shared-secret authentication for webhook callers.
//!
//! Every `/api/v1` route takes a [`WebhookAuth`] extractor, which checks the
//! `X-Webhook-Token` header against the configured `WEBHOOK_TOKEN`.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use constant_time_eq::constant_time_eq;

use courier_common::error::AppError;

use crate::state::AppState;

pub const WEBHOOK_TOKEN_HEADER: &str = "x-webhook-token";

/// Proof that the request carried the webhook token.
#[derive(Debug, Clone, Copy)]
pub struct WebhookAuth;

impl FromRequestParts<AppState> for WebhookAuth {
    type Rejection = AppError;

    fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let result = check_token(
            parts
                .headers
                .get(WEBHOOK_TOKEN_HEADER)
                .and_then(|v| v.to_str().ok()),
            &state.config.webhook_token,
        );

        async move { result }
    }
}

fn check_token(provided: Option<&str>, expected: &str) -> Result<WebhookAuth, AppError> {
    let Some(token) = provided else {
        tracing::warn!("Rejected request without webhook token");
        return Err(AppError::Auth("Missing X-Webhook-Token header".to_string()));
    };

    if expected.is_empty() || !constant_time_eq(token.as_bytes(), expected.as_bytes()) {
        tracing::warn!("Rejected request with invalid webhook token");
        return Err(AppError::Auth("Invalid webhook token".to_string()));
    }

    Ok(WebhookAuth)
}
