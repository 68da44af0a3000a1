//! Initialization helpers for the application:
//! - database connection + migrations
//! - background worker spawn helpers

use std::{path::Path, sync::Arc, time::Duration};

use anyhow::Result;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

use crate::config::Config;
use crate::services::reminders::{ReminderNotifier, ReminderScheduler};

/// Redact potentially sensitive information from a database URL before logging.
///
/// Attempts to parse the URL and remove userinfo (username:password) components.
/// Falls back to removing everything before '@' or returning "(redacted)".
pub fn redact_db_url(db_url: &str) -> String {
    if let Ok(url) = url::Url::parse(db_url) {
        let scheme = url.scheme();
        let host = url.host_str().unwrap_or("");
        let port_part = url.port().map(|p| format!(":{}", p)).unwrap_or_default();
        let path = url.path();
        format!("{}://{}{}{}", scheme, host, port_part, path)
    } else {
        if let Some(at_pos) = db_url.find('@') {
            let without_creds = &db_url[at_pos + 1..];
            return format!("(redacted){}", without_creds);
        }
        "(redacted)".to_string()
    }
}

/// Open the SQLite pool and run migrations.
///
/// The database file and its parent directory are created when missing. WAL
/// mode plus a busy timeout let the request workers and the reminder sweep
/// share the file without spurious `SQLITE_BUSY` failures.
pub async fn init_db(config: &Config) -> Result<sqlx::SqlitePool> {
    let db_url = &config.database.url;
    tracing::info!("Connecting to database: {}", redact_db_url(db_url));

    let db_path = db_url.strip_prefix("sqlite://").unwrap_or(db_url);
    let db_file_path = Path::new(db_path);

    if let Some(parent) = db_file_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                anyhow::anyhow!(
                    "Failed to create database directory {}: {}",
                    parent.display(),
                    e
                )
            })?;
        }
    }

    let connect_options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect_with(connect_options)
        .await?;

    tracing::info!("Connected to database file: {}", db_file_path.display());

    tracing::info!("Running database migrations");
    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// Spawn background workers:
/// - periodic reminder sweep
///
/// Returns the `JoinHandle`s so callers can await task shutdown. Each worker
/// listens for a shutdown notification on `shutdown`.
pub fn spawn_background_workers(
    state: Arc<crate::AppState>,
    shutdown: tokio::sync::broadcast::Sender<()>,
) -> Vec<tokio::task::JoinHandle<()>> {
    let mut handles = Vec::new();

    if !state.config.reminder.enabled {
        tracing::info!("Reminder sweep worker disabled");
        return handles;
    }

    // Reminder sweep worker
    {
        let mut shutdown_rx = shutdown.subscribe();
        let state = state.clone();
        handles.push(tokio::spawn(async move {
            let scheduler = ReminderScheduler::from_state(&state);
            let notifier = ReminderNotifier::from_state(&state);
            let poll_interval = Duration::from_secs(state.config.reminder.poll_interval_seconds);
            tracing::info!(
                "Reminder sweep worker {} started (every {:?})",
                scheduler.worker_id(),
                poll_interval
            );

            loop {
                if shutdown_rx.try_recv().is_ok() {
                    tracing::info!("Reminder sweep worker received shutdown signal");
                    break;
                }

                match scheduler.sweep(&notifier, Utc::now().naive_utc()).await {
                    Ok(report) => {
                        tracing::debug!(
                            "Reminder sweep finished: leased {}, sent {}, failed {}",
                            report.leased,
                            report.sent,
                            report.failed
                        );
                    }
                    Err(e) => {
                        tracing::warn!("Reminder sweep failed: {:?}", e);
                    }
                }

                // Wait before next poll or exit early on shutdown.
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Reminder sweep worker shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(poll_interval) => {}
                }
            }
        }));
    }

    handles
}
