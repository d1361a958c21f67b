use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Per-context delivery override, e.g. a server-wide notification channel.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct ContextSettings {
    pub context_id: i64,
    pub notification_channel_id: Option<i64>,
    pub updated_at: DateTime<Utc>,
}
