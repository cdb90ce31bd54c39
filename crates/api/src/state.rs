//! Shared application state for the Axum API server.

use std::sync::Arc;

use courier_common::config::AppConfig;
use courier_notifier::Dispatcher;
use courier_notifier::orders::OrderNotifications;
use courier_scheduler::ReminderScheduler;

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub notifications: Arc<OrderNotifications>,
    pub scheduler: Arc<ReminderScheduler>,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        notifications: Arc<OrderNotifications>,
        scheduler: Arc<ReminderScheduler>,
        config: AppConfig,
    ) -> Self {
        Self {
            dispatcher,
            notifications,
            scheduler,
            config,
        }
    }
}
