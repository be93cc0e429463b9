//! Event Log repository.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use tracing::debug;

use datalayer_core::{
    page_offset, Error, EventLogEntry, EventLogRepository, LogPage, NewEventLogEntry, Result,
};

/// PostgreSQL implementation of EventLogRepository.
#[derive(Clone)]
pub struct PgEventLogRepository {
    pool: Pool<Postgres>,
}

impl PgEventLogRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_row(row: &PgRow) -> EventLogEntry {
        EventLogEntry {
            id: row.get("id"),
            event_time: row.get("event_time"),
            event_name: row.get("event_name"),
            user_id: row.get("user_id"),
            user_role: row.get("user_role"),
            event_data: row.get("event_data"),
        }
    }
}

#[async_trait]
impl EventLogRepository for PgEventLogRepository {
    async fn append(&self, entry: NewEventLogEntry) -> Result<i64> {
        let row = sqlx::query(
            "INSERT INTO event_log (event_name, user_id, user_role, event_data)
             VALUES ($1, $2, $3, $4)
             RETURNING id",
        )
        .bind(&entry.event_name)
        .bind(entry.user_id)
        .bind(&entry.user_role)
        .bind(&entry.event_data)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        let id: i64 = row.get("id");
        debug!(
            subsystem = "db",
            component = "event_log",
            op = "append",
            event_name = %entry.event_name,
            id,
            "Event logged"
        );
        Ok(id)
    }

    async fn recent(&self, limit: i64) -> Result<Vec<EventLogEntry>> {
        let rows = sqlx::query(
            "SELECT id, event_time, event_name, user_id, user_role, event_data
             FROM event_log ORDER BY event_time DESC, id DESC LIMIT $1",
        )
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(Self::parse_row).collect())
    }

    async fn paginate(&self, page: i64, page_size: i64) -> Result<LogPage<EventLogEntry>> {
        let rows = sqlx::query(
            "SELECT id, event_time, event_name, user_id, user_role, event_data
             FROM event_log ORDER BY event_time DESC, id DESC LIMIT $1 OFFSET $2",
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
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM event_log")
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(total)
    }

    async fn clear(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM event_log")
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected())
    }
}
