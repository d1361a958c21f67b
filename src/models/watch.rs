use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::StockStatus;

/// One (subscriber, context, target) subscription and its last observed state.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct WatchRecord {
    pub id: i64,
    pub subscriber_id: i64,
    pub context_id: Option<i64>,
    pub target_code: String,

    // Last observed state, unset until the first poll
    pub last_status: Option<StockStatus>,
    pub last_button_detected: Option<String>,
    pub last_checked_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewWatch {
    pub subscriber_id: i64,
    pub context_id: Option<i64>,
    pub target_code: String,
}

impl NewWatch {
    pub fn new(subscriber_id: i64, context_id: Option<i64>, target_code: &str) -> Self {
        Self {
            subscriber_id,
            context_id,
            target_code: target_code.trim().to_string(),
        }
    }
}

/// State written back after every poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchState {
    pub status: StockStatus,
    pub button_detected: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl WatchRecord {
    pub fn is_first_check(&self) -> bool {
        self.last_status.is_none()
    }
}
