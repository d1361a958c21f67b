use serde::{Deserialize, Serialize};

use crate::models::StockStatus;

/// Output of the classifier alone; the checker fills in the page details.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Classification {
    pub available: bool,
    pub status: StockStatus,
    pub message: String,
    /// Raw purchase-button text. Informational, never drives `status`.
    pub button_detected: Option<String>,
}

/// Result of one stock check for a target code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StockResult {
    pub available: bool,
    pub status: StockStatus,
    pub message: String,
    pub button_detected: Option<String>,
    pub product_name: String,
    pub price: Option<String>,
    pub source_url: String,
}

impl StockResult {
    pub fn from_classification(
        classification: Classification,
        product_name: String,
        price: Option<String>,
        source_url: String,
    ) -> Self {
        Self {
            available: classification.available,
            status: classification.status,
            message: classification.message,
            button_detected: classification.button_detected,
            product_name,
            price,
            source_url,
        }
    }

    /// An ERROR result. Always unavailable and without a detected button.
    pub fn error(target_code: &str, source_url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            available: false,
            status: StockStatus::Error,
            message: message.into(),
            button_detected: None,
            product_name: format!("Set {}", target_code),
            price: None,
            source_url: source_url.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == StockStatus::Error
    }
}
