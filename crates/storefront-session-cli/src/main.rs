//! storefront-session - inspect and drive the local storefront session.
//!
//! Each invocation behaves like a fresh browser tab: its volatile tier
//! starts empty and the durable tier on disk is shared with every other
//! invocation.

mod provider;

use std::io;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local, Utc};
use storefront_session_core::utils::format_remaining;
use storefront_session_core::{
    AuthStateSync, AutoRefreshScheduler, FileTier, Identity, IdentityProvider, MemoryTier,
    SecretStore, SessionConfig, SessionManager, SessionOutcome, SessionRecord, SessionStore,
    SystemClock, TickOutcome,
};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use provider::LocalProvider;

// ============================================================================
// Constants
// ============================================================================

/// Directory for an optional rolling log file
const LOG_DIR_ENV: &str = "STOREFRONT_SESSION_LOG_DIR";

const LOG_FILE_PREFIX: &str = "storefront-session.log";

const USAGE: &str = "\
Usage: storefront-session <command>

Commands:
  login <uid> <email> [display name...]   Sign in and create a session
  status                                  Validate the current session
  whoami                                  Show the cached user without validating
  refresh                                 Re-issue the current session
  logout                                  Sign out and clear the session
  watch                                   Keep the session fresh until Ctrl-C";

enum Command {
    Login(Identity),
    Status,
    WhoAmI,
    Refresh,
    Logout,
    Watch,
}

impl Command {
    fn parse(args: &[String]) -> Result<Self> {
        let Some(name) = args.first() else {
            bail!("missing command\n\n{}", USAGE);
        };
        match name.as_str() {
            "login" => {
                let (Some(uid), Some(email)) = (args.get(1), args.get(2)) else {
                    bail!("login needs a user id and an email\n\n{}", USAGE);
                };
                let display_name = args[3..].join(" ");
                Ok(Command::Login(Identity::new(uid.as_str(), email.as_str(), display_name)))
            }
            "status" => Ok(Command::Status),
            "whoami" => Ok(Command::WhoAmI),
            "refresh" => Ok(Command::Refresh),
            "logout" => Ok(Command::Logout),
            "watch" => Ok(Command::Watch),
            other => bail!("unknown command '{}'\n\n{}", other, USAGE),
        }
    }
}

/// Initialize the tracing subscriber for logging
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var(LOG_DIR_ENV) {
        Ok(dir) if !dir.is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

fn build_manager(config: &SessionConfig) -> Result<Arc<SessionManager>> {
    let key = SecretStore::load_or_create().context("Failed to load signing key")?;
    let data_dir = config.data_dir().context("Failed to resolve data directory")?;
    info!(data_dir = %data_dir.display(), "Durable session tier");

    let store = SessionStore::new(
        Box::new(MemoryTier::new()),
        Box::new(FileTier::new(data_dir)),
        &config.key_prefix,
    );
    let manager = SessionManager::from_config(config, &key, store, Arc::new(SystemClock))
        .context("Invalid session configuration")?;
    Ok(Arc::new(manager))
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _log_guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = Command::parse(&args)?;

    let config = SessionConfig::load().context("Failed to load config")?;
    let manager = build_manager(&config)?;
    manager.initialize();

    match command {
        Command::Login(identity) => login(&manager, identity).await,
        Command::Status => Ok(status(&manager)),
        Command::WhoAmI => {
            match manager.get_session_user() {
                Some(user) => println!("{} <{}> ({})", user.label(), user.email, user.user_id),
                None => println!("Not signed in"),
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Refresh => match manager.refresh_session() {
            Ok(record) => {
                print_record("Session refreshed", &record);
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => {
                println!("{}", e);
                Ok(ExitCode::FAILURE)
            }
        },
        Command::Logout => logout(&manager).await,
        Command::Watch => watch(manager, &config).await,
    }
}

async fn login(manager: &Arc<SessionManager>, identity: Identity) -> Result<ExitCode> {
    let provider = LocalProvider::new();
    let sync = AuthStateSync::new(manager.clone()).spawn(provider.subscribe());

    // A fresh sign-in always replaces whatever session was stored before
    if let Err(e) = manager.create_session(&identity) {
        println!("Signed in, but the session was not saved: {}", e);
    }
    provider.sign_in(identity);
    drop(provider);
    sync.await.context("Session sync task failed")?;

    Ok(status(manager))
}

async fn logout(manager: &Arc<SessionManager>) -> Result<ExitCode> {
    let provider = LocalProvider::new();
    let sync = AuthStateSync::new(manager.clone()).spawn(provider.subscribe());

    provider.sign_out();
    drop(provider);
    sync.await.context("Session sync task failed")?;

    println!("Signed out");
    Ok(ExitCode::SUCCESS)
}

async fn watch(manager: Arc<SessionManager>, config: &SessionConfig) -> Result<ExitCode> {
    let scheduler = AutoRefreshScheduler::from_config(manager.clone(), config);
    println!(
        "Checking every {}, refreshing when less than {} remains. Ctrl-C to stop.",
        format_remaining(chrono::Duration::seconds(config.refresh_interval_secs as i64)),
        format_remaining(config.refresh_threshold()),
    );
    refresh_if_due(&scheduler);

    let mut handle = scheduler.start();
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    handle.cancel().await;

    Ok(status(&manager))
}

fn refresh_if_due(scheduler: &AutoRefreshScheduler) {
    if let TickOutcome::Refreshed(record) = scheduler.tick() {
        print_record("Session refreshed", &record);
    }
}

fn status(manager: &SessionManager) -> ExitCode {
    match manager.validate_current_session() {
        SessionOutcome::Valid {
            user_id,
            email,
            user,
            expiry,
            ..
        } => {
            let remaining = manager.remaining_ttl().unwrap_or_else(chrono::Duration::zero);
            println!("Signed in as {} <{}> ({})", user.display_name, email, user_id);
            println!(
                "Session expires {} ({} left)",
                format_expiry(expiry),
                format_remaining(remaining)
            );
            ExitCode::SUCCESS
        }
        SessionOutcome::Invalid(reason) => {
            println!("Not signed in: {}", reason);
            ExitCode::FAILURE
        }
    }
}

fn print_record(heading: &str, record: &SessionRecord) {
    let until = record
        .expires_at()
        .map(format_local)
        .unwrap_or_else(|| record.expiry.to_string());
    println!("{}: {} until {}", heading, record.user.uid, until);
}

fn format_expiry(expiry: i64) -> String {
    DateTime::from_timestamp_millis(expiry)
        .map(format_local)
        .unwrap_or_else(|| expiry.to_string())
}

fn format_local(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%b %d, %Y %H:%M").to_string()
}
