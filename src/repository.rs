use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};

use crate::models::{ContextSettings, NewWatch, WatchRecord, WatchState};
use crate::utils::error::AppError;
use crate::Result;

#[derive(Debug, Clone, PartialEq)]
pub enum AddWatchOutcome {
    Added(WatchRecord),
    AlreadyExists,
}

/// Durable store of watches and per-context delivery settings.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WatchRepository: Send + Sync {
    async fn add_watch(&self, watch: &NewWatch) -> Result<AddWatchOutcome>;

    /// Returns `false` when no such watch existed.
    async fn remove_watch(&self, subscriber_id: i64, context_id: Option<i64>, target_code: &str) -> Result<bool>;

    async fn get_watch(&self, id: i64) -> Result<Option<WatchRecord>>;

    /// Watches of one subscriber in one context, newest first.
    async fn list_watches(&self, subscriber_id: i64, context_id: Option<i64>) -> Result<Vec<WatchRecord>>;

    /// Every watch in poll order: never checked first, then least recently
    /// checked, then oldest.
    async fn list_all_watches(&self) -> Result<Vec<WatchRecord>>;

    async fn update_watch_state(&self, id: i64, state: &WatchState) -> Result<()>;

    async fn set_notification_channel(&self, context_id: i64, channel_id: i64) -> Result<()>;

    /// Returns `false` when no override was set.
    async fn clear_notification_channel(&self, context_id: i64) -> Result<bool>;

    async fn notification_channel(&self, context_id: i64) -> Result<Option<i64>>;
}

const WATCH_COLUMNS: &str = "id, subscriber_id, context_id, target_code, last_status, \
     last_button_detected, last_checked_at, created_at";

#[derive(Clone)]
pub struct SqliteWatchRepository {
    pool: SqlitePool,
}

impl SqliteWatchRepository {
    /// Opens (creating if needed) the database file and applies migrations.
    pub async fn connect(path: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let repository = Self::from_pool(pool).await?;
        info!("Database initialized at {}", path);
        Ok(repository)
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn context_settings(&self, context_id: i64) -> Result<Option<ContextSettings>> {
        let settings = sqlx::query_as::<_, ContextSettings>(
            "SELECT context_id, notification_channel_id, updated_at \
             FROM context_settings WHERE context_id = ?",
        )
        .bind(context_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(settings)
    }
}

#[async_trait]
impl WatchRepository for SqliteWatchRepository {
    async fn add_watch(&self, watch: &NewWatch) -> Result<AddWatchOutcome> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO watches (subscriber_id, context_id, target_code, created_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(watch.subscriber_id)
        .bind(watch.context_id)
        .bind(&watch.target_code)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            debug!(
                subscriber_id = watch.subscriber_id,
                target_code = watch.target_code.as_str(),
                "Watch already exists"
            );
            return Ok(AddWatchOutcome::AlreadyExists);
        }

        let id = result.last_insert_rowid();
        let record = self
            .get_watch(id)
            .await?
            .ok_or_else(|| AppError::Persistence(format!("inserted watch {} not found", id)))?;

        Ok(AddWatchOutcome::Added(record))
    }

    async fn remove_watch(&self, subscriber_id: i64, context_id: Option<i64>, target_code: &str) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM watches WHERE subscriber_id = ? AND context_id IS ? AND target_code = ?",
        )
        .bind(subscriber_id)
        .bind(context_id)
        .bind(target_code)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_watch(&self, id: i64) -> Result<Option<WatchRecord>> {
        let record = sqlx::query_as::<_, WatchRecord>(&format!(
            "SELECT {} FROM watches WHERE id = ?",
            WATCH_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn list_watches(&self, subscriber_id: i64, context_id: Option<i64>) -> Result<Vec<WatchRecord>> {
        let records = sqlx::query_as::<_, WatchRecord>(&format!(
            "SELECT {} FROM watches WHERE subscriber_id = ? AND context_id IS ? \
             ORDER BY created_at DESC, id DESC",
            WATCH_COLUMNS
        ))
        .bind(subscriber_id)
        .bind(context_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn list_all_watches(&self) -> Result<Vec<WatchRecord>> {
        // NULLs sort first in SQLite, so unchecked watches lead
        let records = sqlx::query_as::<_, WatchRecord>(&format!(
            "SELECT {} FROM watches ORDER BY last_checked_at ASC, created_at ASC, id ASC",
            WATCH_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn update_watch_state(&self, id: i64, state: &WatchState) -> Result<()> {
        let result = sqlx::query(
            "UPDATE watches SET last_status = ?, last_button_detected = ?, last_checked_at = ? \
             WHERE id = ?",
        )
        .bind(state.status)
        .bind(&state.button_detected)
        .bind(state.checked_at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound {
                resource: format!("watch {}", id),
            });
        }
        Ok(())
    }

    async fn set_notification_channel(&self, context_id: i64, channel_id: i64) -> Result<()> {
        sqlx::query(
            "INSERT INTO context_settings (context_id, notification_channel_id, updated_at) \
             VALUES (?, ?, ?) \
             ON CONFLICT(context_id) DO UPDATE SET \
                 notification_channel_id = excluded.notification_channel_id, \
                 updated_at = excluded.updated_at",
        )
        .bind(context_id)
        .bind(channel_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn clear_notification_channel(&self, context_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM context_settings WHERE context_id = ?")
            .bind(context_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn notification_channel(&self, context_id: i64) -> Result<Option<i64>> {
        Ok(self
            .context_settings(context_id)
            .await?
            .and_then(|settings| settings.notification_channel_id))
    }
}
