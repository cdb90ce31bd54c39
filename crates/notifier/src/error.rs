use thiserror::Error;

use courier_common::error::AppError;
use courier_common::types::RecipientType;

/// Failures that can occur while dispatching a single event.
///
/// Only `UnknownTemplate` ends a dispatch early. Every other variant is
/// folded into a per-recipient outcome or logged.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Template for type \"{0}\" not found")]
    UnknownTemplate(String),

    #[error("{recipient_type} with ID {id} not found")]
    RecipientNotFound {
        recipient_type: RecipientType,
        id: i64,
    },

    #[error("{recipient_type} {name} (#{id}) has no Telegram address configured")]
    RecipientUnreachable {
        recipient_type: RecipientType,
        id: i64,
        name: String,
    },

    #[error("Delivery failed after {attempts} attempt(s): {detail}")]
    DeliveryFailed { attempts: u32, detail: String },

    #[error("History persistence error: {0}")]
    HistoryPersistence(String),

    #[error("Record store error: {0}")]
    Store(#[from] AppError),
}

impl DispatchError {
    /// Whether this error means "skip the recipient" rather than "the attempt failed".
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            DispatchError::RecipientNotFound { .. } | DispatchError::RecipientUnreachable { .. }
        )
    }
}
