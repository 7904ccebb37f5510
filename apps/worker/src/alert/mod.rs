use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::AlertsConfig;

pub mod twilio;

pub use twilio::TwilioSmsDispatcher;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid recipient: {0:?}")]
    InvalidRecipient(String),
    #[error("alert message is empty")]
    EmptyMessage,
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("gateway rejected the message with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Delivers a human-readable notification to a subscriber.
///
/// Delivery is best effort: callers log failures and move on.
#[async_trait]
pub trait AlertDispatcher: Send + Sync {
    async fn notify(&self, recipient: &str, message: &str) -> Result<(), DispatchError>;
}

/// Dispatcher used when no SMS gateway is configured
pub struct LogDispatcher;

#[async_trait]
impl AlertDispatcher for LogDispatcher {
    async fn notify(&self, recipient: &str, message: &str) -> Result<(), DispatchError> {
        if message.trim().is_empty() {
            return Err(DispatchError::EmptyMessage);
        }
        info!(recipient, message, "alert (no SMS gateway configured)");
        Ok(())
    }
}

/// Pick the dispatcher matching the alerts configuration
pub fn from_config(config: &AlertsConfig) -> Result<Arc<dyn AlertDispatcher>, DispatchError> {
    match &config.twilio {
        Some(twilio) => Ok(Arc::new(TwilioSmsDispatcher::new(twilio.clone())?)),
        None => {
            warn!("no SMS gateway configured, alerts will only be logged");
            Ok(Arc::new(LogDispatcher))
        }
    }
}
