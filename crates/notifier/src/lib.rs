//! Notification dispatch for order lifecycle events.
//!
//! Events are rendered by the [`templates`] registry, routed to directors
//! and masters by the [`resolver`], and delivered through a
//! [`channel::MessageChannel`] with bounded retries. The [`dispatcher`]
//! ties these together and reports one outcome per recipient.

pub mod channel;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod format;
pub mod memory;
pub mod orders;
pub mod postgres;
pub mod resolver;
pub mod store;
pub mod telegram;
pub mod templates;

pub use dispatcher::{DeliveryOutcome, DispatchReport, DispatchStatus, Dispatcher, LinkConfig};
pub use error::DispatchError;
pub use event::{Event, EventDetails, EventKind, RawEvent};
