use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use url::Url;

/// One week.
const MAX_INTERVAL_MINUTES: u64 = 7 * 24 * 60;
const MAX_RATE_LIMIT_DELAY_SECS: f64 = 3600.0;
const MAX_REQUEST_TIMEOUT_SECS: u64 = 600;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub discord: DiscordConfig,
    pub monitor: MonitorConfig,
    pub scraper: ScraperConfig,
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    pub bot_token: String,
    pub api_base: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub interval_minutes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    pub base_url: String,
    pub rate_limit_delay_secs: f64,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub file: Option<String>,
}

impl AppConfig {
    /// Loads `.env`, config files and environment variables, then validates.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self::load()?;
        config.validate()?;
        Ok(config)
    }

    /// Layered load without validation. One-off checks only need the
    /// scraper section, see [`AppConfig::validate_scraper`].
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let s = Self::defaults()?
            .add_source(File::with_name("config/default").required(false))
            // Add local config (ignored by git)
            .add_source(File::with_name("config/local").required(false))
            // Add environment variables with prefix "BRICKWATCH__"
            .add_source(
                Environment::with_prefix("BRICKWATCH")
                    .prefix_separator("__")
                    .separator("__"),
            )
            // Plain names used by existing deployments win over everything else
            .set_override_option("discord.bot_token", env::var("DISCORD_BOT_TOKEN").ok())?
            .set_override_option(
                "monitor.interval_minutes",
                env::var("MONITOR_INTERVAL_MINUTES").ok(),
            )?
            .set_override_option(
                "scraper.rate_limit_delay_secs",
                env::var("RATE_LIMIT_DELAY_SECONDS").ok(),
            )?
            .set_override_option("database.path", env::var("DATABASE_PATH").ok())?
            .build()?;

        s.try_deserialize()
    }

    /// Builder pre-populated with every default value.
    pub fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("discord.bot_token", "")?
            .set_default("discord.api_base", "https://discord.com/api/v10")?
            .set_default("monitor.interval_minutes", 5_i64)?
            .set_default("scraper.base_url", "https://www.lego.com")?
            .set_default("scraper.rate_limit_delay_secs", 2.0_f64)?
            .set_default("scraper.request_timeout_secs", 15_i64)?
            .set_default("database.path", "lego_bot.db")?
            .set_default("database.max_connections", 5_i64)?
            .set_default("server.enabled", true)?
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080_i64)?
            .set_default("logging.file", "brickwatch.log")
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.discord.bot_token.trim().is_empty() {
            return Err(ConfigError::Message(
                "DISCORD_BOT_TOKEN is required (discord.bot_token)".into(),
            ));
        }

        if Url::parse(&self.discord.api_base).is_err() {
            return Err(ConfigError::Message("Invalid Discord API base URL".into()));
        }

        if self.monitor.interval_minutes == 0 {
            return Err(ConfigError::Message(
                "Monitor interval_minutes must be greater than 0".into(),
            ));
        }

        if self.monitor.interval_minutes > MAX_INTERVAL_MINUTES {
            return Err(ConfigError::Message(format!(
                "Monitor interval_minutes must be at most {}",
                MAX_INTERVAL_MINUTES
            )));
        }

        self.validate_scraper()?;

        if self.database.path.trim().is_empty() {
            return Err(ConfigError::Message("Database path must not be empty".into()));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Message(
                "Database max_connections must be greater than 0".into(),
            ));
        }

        if self.server.enabled && self.server.port == 0 {
            return Err(ConfigError::Message("Server port must be greater than 0".into()));
        }

        Ok(())
    }

    pub fn validate_scraper(&self) -> Result<(), ConfigError> {
        if Url::parse(&self.scraper.base_url).is_err() {
            return Err(ConfigError::Message("Invalid scraper base URL format".into()));
        }

        let delay = self.scraper.rate_limit_delay_secs;
        if !delay.is_finite() || delay < 0.0 {
            return Err(ConfigError::Message(
                "Scraper rate_limit_delay_secs must be a non-negative number".into(),
            ));
        }

        if delay > MAX_RATE_LIMIT_DELAY_SECS {
            return Err(ConfigError::Message(format!(
                "Scraper rate_limit_delay_secs must be at most {}",
                MAX_RATE_LIMIT_DELAY_SECS
            )));
        }

        if self.scraper.request_timeout_secs == 0 {
            return Err(ConfigError::Message(
                "Scraper request_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.scraper.request_timeout_secs > MAX_REQUEST_TIMEOUT_SECS {
            return Err(ConfigError::Message(format!(
                "Scraper request_timeout_secs must be at most {}",
                MAX_REQUEST_TIMEOUT_SECS
            )));
        }

        Ok(())
    }

    // Accessors clamp out-of-range values instead of panicking.

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.monitor.interval_minutes.min(MAX_INTERVAL_MINUTES) * 60)
    }

    pub fn rate_limit_delay(&self) -> Duration {
        let secs = self.scraper.rate_limit_delay_secs;
        if secs.is_nan() {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(secs.clamp(0.0, MAX_RATE_LIMIT_DELAY_SECS))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.scraper.request_timeout_secs)
    }

    /// Log file path, `None` when file logging is disabled.
    pub fn log_file(&self) -> Option<&str> {
        self.logging
            .file
            .as_deref()
            .map(str::trim)
            .filter(|path| !path.is_empty())
    }
}
