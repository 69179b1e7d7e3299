//! Structured operator notifications.
//!
//! Components report noteworthy outcomes (tick summaries, failed transfers,
//! the fatal halt) through a [`Notifier`] passed in explicitly. Delivery to a
//! chat channel is a separate sink implementing the same trait.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyLevel {
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for NotifyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Sink for operator-facing events.
pub trait Notifier: Send + Sync {
    fn notify(&self, level: NotifyLevel, message: &str, context: serde_json::Value);
}

/// Forwards notifications to `tracing` under the `chainmigrate::notify` target.
#[derive(Debug, Default, Clone)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, level: NotifyLevel, message: &str, context: serde_json::Value) {
        match level {
            NotifyLevel::Info => {
                tracing::info!(target: "chainmigrate::notify", %context, "{message}")
            }
            NotifyLevel::Warn => {
                tracing::warn!(target: "chainmigrate::notify", %context, "{message}")
            }
            NotifyLevel::Error => {
                tracing::error!(target: "chainmigrate::notify", %context, "{message}")
            }
        }
    }
}
