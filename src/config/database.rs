//! Database configuration module.
//!
//! Handles connection setup and table creation using `SeaORM`. Tables are
//! generated from the entity definitions with `Schema::create_table_from_entity`,
//! so the schema always matches the Rust models without hand-written SQL.

use crate::entities::{AutoBalanceSource, Budget, BudgetMember, LedgerEntry};
use crate::errors::{Error, Result};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Schema};
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, instrument, warn};

const DEFAULT_DATABASE_URL: &str = "sqlite://data/budget.sqlite?mode=rwc";

/// `[database]` section of config.toml
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Connection URL; `DATABASE_URL` wins when set
    pub url: String,
    /// Attempts made to reach the database at startup
    pub connect_retries: u32,
    /// Pause between startup attempts
    pub connect_interval_ms: u64,
    /// Pool size
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
            connect_retries: 10,
            connect_interval_ms: 500,
            max_connections: 10,
        }
    }
}

impl DatabaseConfig {
    /// Applies `DATABASE_URL`, `DB_CONNECT_RETRIES` and `DB_CONNECT_INTERVAL_MS`.
    /// Unparseable numbers are ignored with a warning.
    pub fn apply_env_overrides(&mut self) {
        if let Some(url) = std::env::var("DATABASE_URL").ok().filter(|u| !u.is_empty()) {
            self.url = url;
        }
        if let Some(retries) = env_number("DB_CONNECT_RETRIES") {
            self.connect_retries = retries;
        }
        if let Some(interval) = env_number("DB_CONNECT_INTERVAL_MS") {
            self.connect_interval_ms = interval;
        }
    }

    fn connect_options(&self) -> ConnectOptions {
        let mut options = ConnectOptions::new(self.url.clone());
        options
            .max_connections(self.max_connections)
            .idle_timeout(Duration::from_secs(10 * 60))
            .max_lifetime(Duration::from_secs(60 * 60))
            .sqlx_logging(false);
        options
    }
}

fn env_number<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    raw.parse()
        .inspect_err(|_| warn!(key, value = %raw, "Ignoring non-numeric environment override"))
        .ok()
}

/// Connects to the configured database, retrying until it answers a ping.
///
/// # Errors
/// Returns the last connection error once `connect_retries` attempts fail.
#[instrument(skip(config), fields(retries = config.connect_retries))]
pub async fn connect_with_retry(config: &DatabaseConfig) -> Result<DatabaseConnection> {
    if config.url.is_empty() {
        return Err(Error::Config {
            message: "database url is required".to_string(),
        });
    }
    ensure_sqlite_parent_dir(&config.url)?;
    let attempts = config.connect_retries.max(1);
    let interval = Duration::from_millis(config.connect_interval_ms);

    let mut last_error = None;
    for attempt in 1..=attempts {
        match try_connect(config).await {
            Ok(db) => {
                info!(attempt, "Database connection established");
                return Ok(db);
            }
            Err(e) => {
                warn!(attempt, attempts, error = %e, "Database connection attempt failed");
                last_error = Some(e);
            }
        }
        if attempt < attempts {
            tokio::time::sleep(interval).await;
        }
    }

    Err(last_error.unwrap_or_else(|| Error::Unavailable {
        message: "no connection attempts were made".to_string(),
    }))
}

/// `mode=rwc` creates the file but not its directory.
fn ensure_sqlite_parent_dir(url: &str) -> Result<()> {
    let Some(rest) = url.strip_prefix("sqlite://") else {
        return Ok(());
    };
    let path = rest.split('?').next().unwrap_or_default();
    if let Some(parent) = std::path::Path::new(path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
    {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

async fn try_connect(config: &DatabaseConfig) -> Result<DatabaseConnection> {
    let db = Database::connect(config.connect_options()).await?;
    db.ping().await?;
    Ok(db)
}

/// Creates all necessary tables from the entity definitions.
///
/// Statements use `IF NOT EXISTS`, so this is safe to run on every startup.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let mut budget_table = schema.create_table_from_entity(Budget);
    let mut ledger_table = schema.create_table_from_entity(LedgerEntry);
    let mut source_table = schema.create_table_from_entity(AutoBalanceSource);
    let mut member_table = schema.create_table_from_entity(BudgetMember);

    for table in [
        budget_table.if_not_exists(),
        ledger_table.if_not_exists(),
        source_table.if_not_exists(),
        member_table.if_not_exists(),
    ] {
        db.execute(builder.build(&*table)).await?;
    }

    Ok(())
}
