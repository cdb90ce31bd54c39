//! HTTP surface of the order courier.
//!
//! Endpoints:
//! - GET  /api/health: liveness
//! - POST /api/v1/notifications/send: generic event dispatch
//! - POST /api/v1/notifications/{kind}: typed order notifications
//! - POST /api/v1/reminders/{close-orders,modern-orders,test}: run reminder passes now

pub mod middleware;
pub mod routes;
pub mod state;
