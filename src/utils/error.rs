use thiserror::Error;

use crate::fetcher::FetchError;
use crate::notifiers::DeliveryError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Browser session error: {0}")]
    Browser(#[from] wreq::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(format!("{}", err))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let app_err: AppError = io_err.into();
        assert!(matches!(app_err, AppError::Io(_)));
    }

    #[test]
    fn test_fetch_error_conversion() {
        let err: AppError = FetchError::Forbidden {
            url: "https://www.lego.com/en-us/product/10312".to_string(),
        }
        .into();
        assert!(matches!(err, AppError::Fetch(FetchError::Forbidden { .. })));
        assert!(err.to_string().starts_with("Fetch error: "));
    }

    #[test]
    fn test_not_found_error() {
        let err = AppError::NotFound {
            resource: "watch 10312".to_string(),
        };
        assert_eq!(err.to_string(), "Not found: watch 10312");
    }
}
