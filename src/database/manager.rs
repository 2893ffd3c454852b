use sqlx::{postgres::PgPoolOptions, PgPool};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

use crate::config::config;
use crate::database::models::ChainError;

/// Bundled schema, applied statement by statement by [`DatabaseManager::migrate`]
const SCHEMA: &str = include_str!("schema.sql");

/// Errors from DatabaseManager and the stores
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Invalid database URL")]
    InvalidDatabaseUrl,

    #[error("Invalid database name: {0}")]
    InvalidDatabaseName(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate: {0}")]
    Duplicate(String),

    /// A compare-and-set update found the row in another state
    #[error("Stale state: {0}")]
    StaleState(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Malformed postponement chain: {0}")]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Map unique-constraint violations onto `Duplicate`
    pub fn from_write(err: sqlx::Error, what: &str) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
                DatabaseError::Duplicate(what.to_string())
            }
            sqlx::Error::ColumnDecode { .. } => DatabaseError::Decode(err.to_string()),
            _ => DatabaseError::Sqlx(err),
        }
    }
}

/// Connection pool cache keyed by database name
pub struct DatabaseManager {
    pools: Arc<RwLock<HashMap<String, PgPool>>>,
}

impl DatabaseManager {
    fn instance() -> &'static DatabaseManager {
        use std::sync::OnceLock;
        static INSTANCE: OnceLock<DatabaseManager> = OnceLock::new();
        INSTANCE.get_or_init(DatabaseManager::new)
    }

    fn new() -> Self {
        Self {
            pools: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Database named by DATABASE_URL, unless CASEBOOK_DB_NAME overrides it
    pub fn main_database_name() -> Result<String, DatabaseError> {
        if let Ok(name) = std::env::var("CASEBOOK_DB_NAME") {
            if !Self::is_valid_db_name(&name) {
                return Err(DatabaseError::InvalidDatabaseName(name));
            }
            return Ok(name);
        }
        let url = Self::base_url()?;
        let name = url.path().trim_start_matches('/').to_string();
        if !Self::is_valid_db_name(&name) {
            return Err(DatabaseError::InvalidDatabaseName(name));
        }
        Ok(name)
    }

    /// Get the main application pool
    pub async fn main_pool() -> Result<PgPool, DatabaseError> {
        let name = Self::main_database_name()?;
        Self::instance().get_pool(&name).await
    }

    /// Get existing pool or create a new one lazily
    async fn get_pool(&self, database_name: &str) -> Result<PgPool, DatabaseError> {
        // Fast path: try read lock
        {
            let pools = self.pools.read().await;
            if let Some(pool) = pools.get(database_name) {
                return Ok(pool.clone());
            }
        }

        let connection_string = Self::build_connection_string(database_name)?;
        let settings = &config().database;
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(Duration::from_secs(settings.connection_timeout))
            .connect(&connection_string)
            .await?;

        {
            let mut pools = self.pools.write().await;
            pools.insert(database_name.to_string(), pool.clone());
        }

        info!(database = database_name, "Created database pool");
        Ok(pool)
    }

    fn base_url() -> Result<url::Url, DatabaseError> {
        let base = std::env::var("DATABASE_URL")
            .map_err(|_| DatabaseError::ConfigMissing("DATABASE_URL"))?;
        url::Url::parse(&base).map_err(|_| DatabaseError::InvalidDatabaseUrl)
    }

    fn build_connection_string(database_name: &str) -> Result<String, DatabaseError> {
        let mut url = Self::base_url()?;
        url.set_path(&format!("/{}", database_name));
        Ok(url.into())
    }

    /// Pings the main pool to ensure connectivity
    pub async fn health_check() -> Result<(), DatabaseError> {
        let pool = Self::main_pool().await?;
        sqlx::query("SELECT 1").execute(&pool).await?;
        Ok(())
    }

    /// Apply the bundled schema. Every statement is idempotent.
    pub async fn migrate(pool: &PgPool) -> Result<usize, DatabaseError> {
        let mut tx = pool.begin().await?;
        let mut applied = 0;
        for statement in Self::schema_statements() {
            sqlx::query(statement).execute(&mut *tx).await?;
            applied += 1;
        }
        tx.commit().await?;
        info!(statements = applied, "Applied database schema");
        Ok(applied)
    }

    fn schema_statements() -> impl Iterator<Item = &'static str> {
        SCHEMA
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty() && !s.lines().all(|l| l.trim().is_empty() || l.trim_start().starts_with("--")))
    }

    /// Close and remove all pools (e.g., on shutdown)
    pub async fn close_all() {
        let manager = Self::instance();
        let mut pools = manager.pools.write().await;
        for (name, pool) in pools.drain() {
            pool.close().await;
            info!(database = %name, "Closed database pool");
        }
    }

    /// Database names are restricted to [a-zA-Z0-9_]+
    fn is_valid_db_name(name: &str) -> bool {
        !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    }
}
