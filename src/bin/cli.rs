//! Menu bot CLI
//!
//! Local execution entry point for the one-shot, polling and batch modes.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use menubot::{
    error::{AppError, Result},
    models::{Config, DayKey},
    pipeline::{
        Backoff, CommandRouter, Dashboard, UpdatePoller, VerdictPipeline, export_dashboard,
    },
    services::{CafeteriaPage, GeminiGenerator, MenuSource, Notifier, TelegramClient, format},
    storage::{CacheStore, CacheStorage, LocalStorage, OffsetStorage},
    utils::http,
};

/// Kumoh cafeteria menu bot
#[derive(Parser, Debug)]
#[command(
    name = "menubot",
    version,
    about = "Pork-free verdicts for the Kumoh cafeteria menus"
)]
struct Cli {
    /// Storage directory holding config.toml and the bot's state files
    #[arg(short, long, default_value = "storage")]
    storage_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send today's verdict to the default chat and exit
    Once {
        /// Ignore the cache and regenerate
        #[arg(long)]
        force: bool,
    },

    /// Answer bot commands until interrupted
    Poll,

    /// Refresh the cached verdicts for every configured weekday
    Week,

    /// Refresh the week and write the dashboard JSON
    Dashboard,

    /// Validate configuration
    Validate,

    /// Show cache, offset and dashboard state
    Info,
}

/// Initialize logging based on verbosity flag and configured level.
fn init_logging(verbose: bool, level: &str) {
    let level = if verbose { "debug" } else { level };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.storage_dir.join("config.toml");
    let (mut config, load_error) = if config_path.exists() {
        match Config::load(&config_path) {
            Ok(config) => (config, None),
            Err(e) => (Config::default(), Some(e)),
        }
    } else {
        (Config::default(), None)
    };
    init_logging(cli.verbose, &config.logging.level);

    log::info!("Menu bot starting...");
    if let Some(e) = load_error {
        log::error!("Config load failed from {}: {}", config_path.display(), e);
        return Err(e);
    }

    config.cache.dir = cli.storage_dir.clone();
    config.apply_env();
    config.validate()?;
    log::info!("Loaded configuration from {}", cli.storage_dir.display());

    let storage = Arc::new(LocalStorage::from_config(&config.cache));

    match cli.command {
        Command::Once { force } => {
            config.require_gemini_key()?;
            config.require_telegram_token()?;
            let chat_id = config.require_default_chat()?;

            let pipeline = build_pipeline(&config, storage)?;
            let telegram = TelegramClient::new(&config.telegram, &config.crawler.user_agent)?;

            let today = DayKey::today(pipeline.store().now(), config.utc_offset());
            let text = match pipeline.run_for_day(&today, force).await {
                Some(verdict) => format::day_message(&today, &verdict),
                None => format::could_not_analyze(&today),
            };
            if !telegram.send(chat_id, &text).await {
                return Err(AppError::telegram("Failed to deliver today's verdict"));
            }
            log::info!("Sent verdict for {} to {}", today, chat_id);
        }

        Command::Poll => {
            config.require_gemini_key()?;
            config.require_telegram_token()?;

            let pipeline = Arc::new(build_pipeline(&config, storage.clone())?);
            let telegram = Arc::new(TelegramClient::new(
                &config.telegram,
                &config.crawler.user_agent,
            )?);
            let router = Arc::new(CommandRouter::new(
                pipeline,
                telegram.clone(),
                storage.clone(),
                &config,
            ));

            let mut poller = UpdatePoller::new(
                telegram,
                storage,
                router,
                Duration::from_secs(config.telegram.poll_timeout_secs),
                Backoff::from_config(&config.poller),
            );
            poller.run().await?;
        }

        Command::Week => {
            config.require_gemini_key()?;

            let pipeline = build_pipeline(&config, storage)?;
            let verdicts = pipeline.run_for_week(&config.cache.weekdays).await?;
            log::info!(
                "Week refreshed: {}/{} days have a verdict",
                verdicts.len(),
                config.cache.weekdays.len()
            );
        }

        Command::Dashboard => {
            config.require_gemini_key()?;

            let pipeline = build_pipeline(&config, storage.clone())?;
            let outcome = export_dashboard(&pipeline, &storage, &config.cache.weekdays).await?;
            log::info!("Dashboard export: {:?}", outcome);
        }

        Command::Validate => {
            log::info!("✓ Config OK ({} cafeterias)", config.cafeterias.len());
            for (name, present) in [
                ("GEMINI_API_KEY", config.gemini.api_key.is_some()),
                ("TELEGRAM_TOKEN", config.telegram.token.is_some()),
                ("TELEGRAM_CHAT_ID", config.telegram.default_chat_id.is_some()),
                ("ADMIN_CHAT_ID", config.telegram.admin_chat_id.is_some()),
            ] {
                if present {
                    log::info!("✓ {} set", name);
                } else {
                    log::warn!("✗ {} not set", name);
                }
            }
            log::info!("All validations passed!");
        }

        Command::Info => {
            log::info!("Storage directory: {}", storage.root_dir().display());

            match storage.read_cache().await {
                Ok(Some(entries)) => {
                    log::info!("Cache: {} entries", entries.len());
                    for (day, entry) in &entries {
                        log::info!(
                            "  {}: {} ({})",
                            day,
                            entry.timestamp.to_rfc3339(),
                            entry.fingerprint
                        );
                    }
                }
                Ok(None) => log::info!("Cache: empty"),
                Err(e) => log::warn!("Cache unreadable: {}", e),
            }

            match storage.read_offset().await {
                Ok(Some(offset)) => log::info!("Poll offset: {}", offset),
                Ok(None) => log::info!("Poll offset: none"),
                Err(e) => log::warn!("Poll offset unreadable: {}", e),
            }

            match storage.read_json::<Dashboard>(storage.dashboard_key()).await {
                Ok(Some(dashboard)) => log::info!(
                    "Dashboard: {} days, updated {}",
                    dashboard.week_data.len(),
                    dashboard.updated_at.to_rfc3339()
                ),
                Ok(None) => log::info!("No dashboard exported yet."),
                Err(e) => log::warn!("Dashboard unreadable: {}", e),
            }
        }
    }

    log::info!("Done!");

    Ok(())
}

/// Wire the scrapers, generator and cache into a pipeline.
fn build_pipeline(config: &Config, storage: Arc<LocalStorage>) -> Result<VerdictPipeline> {
    let client = http::create_async_client(&config.crawler)?;
    let sources: Vec<Arc<dyn MenuSource>> = CafeteriaPage::from_config(&config.cafeterias, &client)
        .into_iter()
        .map(|page| Arc::new(page) as Arc<dyn MenuSource>)
        .collect();
    let generator = Arc::new(GeminiGenerator::new(
        &config.gemini,
        &config.crawler.user_agent,
    )?);

    Ok(VerdictPipeline::new(
        sources,
        generator,
        Arc::new(CacheStore::new(storage)),
        config.freshness(),
    ))
}
