//! # Sea of Thieves News Bot
//!
//! Polls the official news listing and relays every new article to a
//! Discord webhook, oldest first.
//!
//! ## Usage
//!
//! ```sh
//! sot_news_bot -c /etc/sot-news-bot/bot.env
//! ```
//!
//! ## Architecture
//!
//! Each poll cycle is a small pipeline:
//! 1. **Fetching**: download the listing page ([`fetch`])
//! 2. **Extraction**: pull article links and titles out of the markup ([`scrapers`])
//! 3. **Diffing**: drop URLs already relayed ([`store`])
//! 4. **Delivery**: post new articles to the webhook, oldest first ([`notify`])
//!
//! [`poller`] drives the cycles until SIGINT/SIGTERM.
//!
//! Startup problems (no webhook configured, unusable state database) end the
//! process with a non-zero status. Once polling starts, every failure is
//! logged and retried on the next cycle.

use clap::Parser;
use std::error::Error;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt, prelude::*};

mod cli;
mod config;
mod fetch;
mod models;
mod notify;
mod poller;
mod scrapers;
mod store;
mod utils;

use cli::Cli;
use config::{DISCORD_WEBHOOK_URL, LOG_FILE, LOG_LEVEL, RawConfig, log_directive};
use fetch::HttpFetcher;
use notify::WebhookNotifier;
use poller::{PollLoop, PollSettings};
use scrapers::ListingExtractor;
use store::StateStore;
use utils::ensure_parent_dir;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Cli::parse();

    // Logging depends on the config file, so read it first and report any
    // problem once the subscriber is up.
    let (raw, load_error) = match RawConfig::load(&args.config) {
        Ok(raw) => (raw, None),
        Err(e) => (RawConfig::default(), Some(e)),
    };
    let raw = raw
        .with_override(DISCORD_WEBHOOK_URL, args.webhook_url.clone())
        .with_override(LOG_LEVEL, args.log_level.clone());

    let log_file = Some(raw.get(LOG_FILE).trim()).filter(|p| !p.is_empty());
    let log_file_error = init_tracing(&log_directive(raw.get(LOG_LEVEL)), log_file.map(Path::new));
    if let Some(e) = log_file_error {
        warn!(path = log_file.unwrap_or_default(), error = %e, "Cannot open log file; logging to stdout only");
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.display(),
        config_found = args.config.exists(),
        "sot_news_bot starting up"
    );

    if let Some(e) = load_error {
        error!(error = %e, "Failed to read configuration; exiting");
        return Err(e.into());
    }
    let config = match raw.resolve() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration; exiting");
            return Err(e.into());
        }
    };

    // ---- State ----
    if let Err(e) = ensure_parent_dir(&config.state_db_path).await {
        error!(
            path = %config.state_db_path.display(),
            error = %e,
            "State directory is not writable (fix perms or choose a different STATE_DB_PATH)"
        );
        return Err(e);
    }
    let store = match StateStore::open(&config.state_db_path).await {
        Ok(store) => store,
        Err(e) => {
            error!(path = %config.state_db_path.display(), error = %e, "Cannot open state database");
            return Err(e.into());
        }
    };
    match store.count().await {
        Ok(recorded) => info!(recorded, "Loaded delivery history"),
        Err(e) => warn!(error = %e, "Cannot count delivery history"),
    }

    // ---- Collaborators ----
    let fetcher = HttpFetcher::new(config.request_timeout, &config.user_agent)?;
    let notifier = WebhookNotifier::new(config.webhook_url.as_str(), config.request_timeout)?;
    let extractor = ListingExtractor::new(config.news_path_pattern.clone());

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    info!(
        source = %config.news_url,
        interval_secs = config.check_interval.as_secs(),
        first_run_cap = config.first_run_cap,
        bot_name = %config.bot_name,
        "Polling started"
    );

    let mut poller = PollLoop::new(
        PollSettings::from_config(&config),
        extractor,
        fetcher,
        notifier,
        store.clone(),
        cancel,
    );
    if args.once {
        poller.run_logged().await;
    } else {
        poller.run().await;
    }

    store.close().await;
    info!("Shut down cleanly");
    Ok(())
}

/// Install the global subscriber: stdout always, plus `log_file` when set.
///
/// Returns the I/O error if the log file could not be opened; logging then
/// goes to stdout only.
fn init_tracing(level: &str, log_file: Option<&Path>) -> Option<std::io::Error> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let stdout = tfmt::layer()
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tfmt::time::UtcTime::rfc_3339());

    let (file, file_error) = match log_file.map(open_log_file) {
        Some(Ok(handle)) => {
            let layer = tfmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_timer(tfmt::time::UtcTime::rfc_3339())
                .with_writer(Mutex::new(handle));
            (Some(layer), None)
        }
        Some(Err(e)) => (None, Some(e)),
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout)
        .with(file)
        .init();
    file_error
}

fn open_log_file(path: &Path) -> std::io::Result<std::fs::File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Cancel `token` on SIGINT or SIGTERM.
#[instrument(level = "info", skip_all)]
async fn cancel_on_signal(token: CancellationToken) {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Cannot listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => info!("Received SIGINT; finishing current work"),
        _ = terminate => info!("Received SIGTERM; finishing current work"),
    }
    token.cancel();
}
