pub mod checker;
pub mod classifier;
pub mod commands;
pub mod config;
pub mod fetcher;
pub mod models;
pub mod notifiers;
pub mod repository;
pub mod scheduler;
pub mod utils;
pub mod web;

// Re-export commonly used types
pub use checker::{StockChecker, StockSource};
pub use commands::CommandService;
pub use config::AppConfig;
pub use fetcher::PageFetcher;
pub use models::{StockResult, StockStatus};
pub use notifiers::{DiscordNotifier, Notifier};
pub use repository::{SqliteWatchRepository, WatchRepository};
pub use scheduler::{PollScheduler, SchedulerStats};
pub use utils::error::AppError;

pub type Result<T> = std::result::Result<T, AppError>;
