//! Delivery of change notifications to subscribers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{StockResult, StockStatus};

pub mod discord;

pub use discord::DiscordNotifier;

/// What changed between two consecutive checks of a watch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Change {
    StatusChanged { previous: StockStatus },
    ButtonChanged { previous: Option<String> },
}

impl Change {
    pub fn kind(&self) -> &'static str {
        match self {
            Change::StatusChanged { .. } => "status",
            Change::ButtonChanged { .. } => "button",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub subscriber_id: i64,
    pub context_id: Option<i64>,
    pub target_code: String,
    pub result: StockResult,
    pub change: Change,
}

/// Where a notification ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    OverrideChannel(i64),
    DirectMessage,
    ContextChannel(i64),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("subscriber {0} not found")]
    NotFound(i64),

    #[error("missing permission: {0}")]
    Forbidden(String),

    #[error("chat API returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("no delivery route for subscriber {0}")]
    NoRoute(i64),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers to `override_channel` if given and postable, else a direct
    /// message, else the first postable channel of the notification's context.
    async fn notify(
        &self,
        notification: &Notification,
        override_channel: Option<i64>,
    ) -> Result<Delivery, DeliveryError>;
}
