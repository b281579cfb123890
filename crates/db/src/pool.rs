use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;

use crate::error::Result;

/// Connection tuning for the cycle database.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub busy_timeout: Duration,
    pub acquire_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            busy_timeout: Duration::from_secs(30),
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

impl PoolSettings {
    fn connect_options(&self, database_url: &str) -> Result<SqliteConnectOptions> {
        Ok(SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(self.busy_timeout))
    }
}

pub async fn create_pool(database_url: &str) -> Result<SqlitePool> {
    open_pool(database_url, &PoolSettings::default()).await
}

/// `sqlite::memory:` databases are private to one connection, so a pool over
/// one needs `max_connections == 1` to read back its own writes.
pub async fn create_pool_with(database_url: &str, max_connections: u32) -> Result<SqlitePool> {
    let settings = PoolSettings {
        max_connections,
        ..PoolSettings::default()
    };
    open_pool(database_url, &settings).await
}

pub async fn open_pool(database_url: &str, settings: &PoolSettings) -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(1)
        .acquire_timeout(settings.acquire_timeout)
        .connect_with(settings.connect_options(database_url)?)
        .await?;
    Ok(pool)
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Open the database and bring its schema up to date.
pub async fn connect(database_url: &str) -> Result<SqlitePool> {
    let pool = create_pool(database_url).await?;
    run_migrations(&pool).await?;
    tracing::debug!(database_url, "Database ready");
    Ok(pool)
}
