//! Reminder passes for orders the assigned master has not closed.
//!
//! Two reconciliation passes scan order state and dispatch synthesized
//! reminder events through the notifier. Watermarks in history storage
//! keep the cadence; per-key claims keep concurrent runs from sending twice.

pub mod lock;
pub mod reminders;
pub mod runner;

pub use lock::{LocalClaims, RedisClaims, ReminderClaims};
pub use reminders::{PassSummary, ReminderScheduler};
pub use runner::{ReminderPasses, ReminderRunner};
