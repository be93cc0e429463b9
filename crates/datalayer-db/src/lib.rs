//! # datalayer-db
//!
//! PostgreSQL storage layer for the datalayer event bridge.
//!
//! This crate provides:
//! - Connection pool management
//! - Event Log and Error Log repositories (append-only, paginated, clearable)
//! - Per-administrator error notice state
//! - The product snapshot catalog used for bridge lookups
//! - In-memory implementations of the same traits
//!
//! ## Example
//!
//! ```rust,ignore
//! use datalayer_db::{Database, EventLogRepository};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/datalayer").await?;
//!     let page = db.event_log.paginate(1, 10).await?;
//!     println!("{} events logged", page.total);
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod error_log;
pub mod event_log;
pub mod memory;
pub mod notice_state;
pub mod pool;
pub mod test_fixtures;

pub use catalog::PgProductCatalog;
pub use error_log::PgErrorLogRepository;
pub use event_log::PgEventLogRepository;
pub use notice_state::PgNoticeStateRepository;
pub use pool::{create_pool, create_pool_with_config, PoolConfig};

// Re-export core types for convenience
pub use datalayer_core::*;

/// Database aggregate holding one repository per table.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Dispatched event envelopes.
    pub event_log: PgEventLogRepository,
    /// Operational errors.
    pub error_log: PgErrorLogRepository,
    /// Per-admin dismissal of the error notice.
    pub notice_state: PgNoticeStateRepository,
    /// Product snapshots.
    pub catalog: PgProductCatalog,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            event_log: PgEventLogRepository::new(pool.clone()),
            error_log: PgErrorLogRepository::new(pool.clone()),
            notice_state: PgNoticeStateRepository::new(pool.clone()),
            catalog: PgProductCatalog::new(pool.clone()),
            pool,
        }
    }

    /// Connect with default pool configuration.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Connect with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}
