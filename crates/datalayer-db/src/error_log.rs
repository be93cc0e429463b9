//! Error Log repository.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};

use datalayer_core::{page_offset, Error, ErrorLogEntry, ErrorLogRepository, LogPage, Result};

/// PostgreSQL implementation of ErrorLogRepository.
#[derive(Clone)]
pub struct PgErrorLogRepository {
    pool: Pool<Postgres>,
}

impl PgErrorLogRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_row(row: &PgRow) -> ErrorLogEntry {
        ErrorLogEntry {
            id: row.get("id"),
            error_time: row.get("error_time"),
            error_message: row.get("error_message"),
        }
    }
}

#[async_trait]
impl ErrorLogRepository for PgErrorLogRepository {
    async fn append(&self, message: &str) -> Result<i64> {
        // Both statements are single-row atomic operations; a crash between
        // them leaves the notice dismissed until the next error.
        let row = sqlx::query("INSERT INTO error_log (error_message) VALUES ($1) RETURNING id")
            .bind(message)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;

        sqlx::query("DELETE FROM admin_notice_state")
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(row.get("id"))
    }

    async fn recent(&self, limit: i64) -> Result<Vec<ErrorLogEntry>> {
        let rows = sqlx::query(
            "SELECT id, error_time, error_message
             FROM error_log ORDER BY error_time DESC, id DESC LIMIT $1",
        )
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(Self::parse_row).collect())
    }

    async fn paginate(&self, page: i64, page_size: i64) -> Result<LogPage<ErrorLogEntry>> {
        let rows = sqlx::query(
            "SELECT id, error_time, error_message
             FROM error_log ORDER BY error_time DESC, id DESC LIMIT $1 OFFSET $2",
        )
        .bind(page_size.max(0))
        .bind(page_offset(page, page_size))
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let total = self.count().await?;
        Ok(LogPage {
            logs: rows.iter().map(Self::parse_row).collect(),
            total,
        })
    }

    async fn count(&self) -> Result<i64> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM error_log")
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(total)
    }

    async fn clear(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM error_log")
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected())
    }
}
