//! Per-administrator dismissal of the error notice.

use async_trait::async_trait;
use sqlx::{Pool, Postgres};

use datalayer_core::{Error, NoticeStateRepository, Result};

/// PostgreSQL implementation of NoticeStateRepository.
#[derive(Clone)]
pub struct PgNoticeStateRepository {
    pool: Pool<Postgres>,
}

impl PgNoticeStateRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NoticeStateRepository for PgNoticeStateRepository {
    async fn is_dismissed(&self, admin_id: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM admin_notice_state WHERE admin_id = $1)",
        )
        .bind(admin_id)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(exists)
    }

    async fn dismiss(&self, admin_id: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO admin_notice_state (admin_id, dismissed_at) VALUES ($1, NOW())
             ON CONFLICT (admin_id) DO UPDATE SET dismissed_at = EXCLUDED.dismissed_at",
        )
        .bind(admin_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn reset_all(&self) -> Result<()> {
        sqlx::query("DELETE FROM admin_notice_state")
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }
}
