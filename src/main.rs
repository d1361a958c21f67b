use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use brickwatch::commands::render_check_reply;
use brickwatch::web::{self, AppState};
use brickwatch::{
    AppConfig, CommandService, DiscordNotifier, PageFetcher, PollScheduler,
    SqliteWatchRepository, StockChecker, StockSource,
};

/// Watches LEGO.com product pages and notifies subscribers when stock changes
#[derive(Parser, Debug)]
#[command(name = "brickwatch", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the poll scheduler and the HTTP command API (default)
    Run,
    /// Check one set once and print the result
    Check {
        /// Set code, e.g. 10312
        code: String,
    },
}

fn init_tracing(log_file: Option<&str>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("brickwatch=info,tower_http=info"))?;

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let path = Path::new(path);
            let directory = path
                .parent()
                .filter(|dir| !dir.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .context("logging.file must name a file")?;

            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();

    Ok(guard)
}

fn build_checker(config: &AppConfig) -> Result<Arc<StockChecker>> {
    let fetcher = PageFetcher::new(
        &config.scraper.base_url,
        config.rate_limit_delay(),
        config.request_timeout(),
    )?;

    Ok(Arc::new(StockChecker::new(
        Arc::new(fetcher),
        &config.scraper.base_url,
    )))
}

async fn check_once(code: &str) -> Result<()> {
    let config = AppConfig::load()?;
    config.validate_scraper()?;
    let _guard = init_tracing(None)?;

    let checker = build_checker(&config)?;
    let result = checker.check_stock(code).await;

    println!("{}", render_check_reply(code, &result));
    Ok(())
}

async fn run(config: AppConfig) -> Result<()> {
    let _guard = init_tracing(config.log_file())?;

    info!("Starting brickwatch v{}", env!("CARGO_PKG_VERSION"));

    let metrics = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Metrics recorder not installed: {}", e);
            None
        }
    };

    info!("Opening database {}", config.database.path);
    let repository = Arc::new(
        SqliteWatchRepository::connect(&config.database.path, config.database.max_connections)
            .await?,
    );

    let checker = build_checker(&config)?;
    let notifier = Arc::new(DiscordNotifier::new(
        &config.discord.api_base,
        &config.discord.bot_token,
        config.request_timeout(),
    )?);

    let scheduler = Arc::new(PollScheduler::new(
        checker.clone(),
        repository.clone(),
        notifier,
        config.poll_interval(),
    ));
    scheduler.start().await;

    if config.server.enabled {
        let state = AppState {
            commands: Arc::new(CommandService::new(checker, repository)),
            scheduler: scheduler.clone(),
            metrics,
        };
        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for ctrl-c: {}", e);
            }
        };

        if let Err(e) = web::serve(&config.server, state, shutdown).await {
            warn!("HTTP server stopped: {}", e);
            tokio::signal::ctrl_c().await?;
        }
    } else {
        tokio::signal::ctrl_c().await?;
    }

    info!("Shutting down...");
    scheduler.shutdown().await;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(AppConfig::from_env()?).await,
        Command::Check { code } => check_once(&code).await,
    }
}
