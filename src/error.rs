use std::time::Duration;
use thiserror::Error;

use crate::models::device::Platform;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("persistence failure: {0}")]
    Persistence(String),

    #[error("notification has no receiver")]
    MissingReceiver,

    #[error("{platform} gateway rejected delivery: {reason}")]
    Gateway { platform: Platform, reason: String },

    #[error("{platform} gateway did not answer within {after:?}")]
    Timeout { platform: Platform, after: Duration },

    #[error("no gateway registered for {0}")]
    NoGateway(Platform),
}

impl NotifyError {
    pub fn gateway(platform: Platform, reason: impl Into<String>) -> Self {
        NotifyError::Gateway {
            platform,
            reason: reason.into(),
        }
    }

    /// True when the failure happened before anything was sent to a gateway.
    pub fn is_persistence(&self) -> bool {
        matches!(self, NotifyError::Persistence(_) | NotifyError::MissingReceiver)
    }
}

impl From<surrealdb::Error> for NotifyError {
    fn from(err: surrealdb::Error) -> Self {
        NotifyError::Persistence(err.to_string())
    }
}

pub type DeliveryResult = Result<(), NotifyError>;
