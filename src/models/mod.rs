use serde::{Deserialize, Serialize};
use std::fmt;

pub mod stock_result;
pub mod watch;
pub mod context_settings;

// Re-exports for convenience
pub use stock_result::*;
pub use watch::*;
pub use context_settings::*;

/// Normalized availability of a product page.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT")]
pub enum StockStatus {
    #[sqlx(rename = "in_stock")]
    InStock,
    #[sqlx(rename = "out_of_stock")]
    OutOfStock,
    #[sqlx(rename = "pre_order")]
    PreOrder,
    #[sqlx(rename = "unknown")]
    Unknown,
    #[sqlx(rename = "error")]
    Error,
}

impl StockStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockStatus::InStock => "in_stock",
            StockStatus::OutOfStock => "out_of_stock",
            StockStatus::PreOrder => "pre_order",
            StockStatus::Unknown => "unknown",
            StockStatus::Error => "error",
        }
    }

    /// Human readable label, e.g. "Out Of Stock".
    pub fn label(&self) -> &'static str {
        match self {
            StockStatus::InStock => "In Stock",
            StockStatus::OutOfStock => "Out Of Stock",
            StockStatus::PreOrder => "Pre Order",
            StockStatus::Unknown => "Unknown",
            StockStatus::Error => "Error",
        }
    }
}

impl fmt::Display for StockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
