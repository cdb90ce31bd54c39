pub mod health;
pub mod notifications;
pub mod reminders;

use axum::Router;

use crate::state::AppState;

/// Build the complete API router with all routes.
pub fn create_router(state: AppState) -> Router {
    let v1 = Router::new()
        .merge(notifications::router())
        .merge(reminders::router());

    Router::new()
        .merge(health::router())
        .nest("/api/v1", v1)
        .with_state(state)
}
