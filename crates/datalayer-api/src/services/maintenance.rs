//! Operator views over the log stores: paginated logs, the error notice and
//! the secret-gated clear.

use std::sync::Arc;

use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use tracing::{info, warn};

use datalayer_core::{
    Error, ErrorLogEntry, ErrorLogRepository, EventLogEntry, EventLogRepository, LogPage,
    NoticeStateRepository, Result,
};

type HmacSha256 = Hmac<Sha256>;

/// How many recent errors the operator notice lists.
pub const NOTICE_RECENT_ERRORS: i64 = 5;

/// State of the operator error notice for one administrator.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorNotice {
    pub show: bool,
    pub recent: Vec<ErrorLogEntry>,
    pub total: i64,
}

/// Row counts removed by a clear.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct ClearedLogs {
    pub events: u64,
    pub errors: u64,
}

#[derive(Clone)]
pub struct MaintenanceService {
    event_log: Arc<dyn EventLogRepository>,
    error_log: Arc<dyn ErrorLogRepository>,
    notices: Arc<dyn NoticeStateRepository>,
    secret: Option<String>,
    page_size: i64,
}

impl MaintenanceService {
    pub fn new(
        event_log: Arc<dyn EventLogRepository>,
        error_log: Arc<dyn ErrorLogRepository>,
        notices: Arc<dyn NoticeStateRepository>,
        secret: Option<String>,
        page_size: i64,
    ) -> Self {
        Self {
            event_log,
            error_log,
            notices,
            secret,
            page_size: page_size.max(1),
        }
    }

    pub fn page_size(&self) -> i64 {
        self.page_size
    }

    pub async fn event_page(&self, page: i64) -> Result<LogPage<EventLogEntry>> {
        self.event_log.paginate(page.max(1), self.page_size).await
    }

    pub async fn error_page(&self, page: i64) -> Result<LogPage<ErrorLogEntry>> {
        self.error_log.paginate(page.max(1), self.page_size).await
    }

    pub async fn recent_events(&self, limit: i64) -> Result<Vec<EventLogEntry>> {
        self.event_log.recent(limit.clamp(1, 100)).await
    }

    /// Notice is shown while errors exist and this admin has not dismissed them.
    pub async fn notice(&self, admin_id: &str) -> Result<ErrorNotice> {
        let total = self.error_log.count().await?;
        if total == 0 {
            return Ok(ErrorNotice {
                show: false,
                recent: Vec::new(),
                total,
            });
        }
        let dismissed = self.notices.is_dismissed(admin_id).await?;
        let recent = self.error_log.recent(NOTICE_RECENT_ERRORS).await?;
        Ok(ErrorNotice {
            show: !dismissed,
            recent,
            total,
        })
    }

    pub async fn dismiss(&self, admin_id: &str) -> Result<()> {
        self.notices.dismiss(admin_id).await
    }

    /// Empty both log tables. Requires the configured maintenance secret;
    /// anything else leaves the tables untouched.
    pub async fn clear_logs(&self, presented: &str) -> Result<ClearedLogs> {
        let expected = self
            .secret
            .as_deref()
            .ok_or_else(|| Error::Forbidden("log clearing is disabled".to_string()))?;

        if !secrets_match(expected, presented)? {
            warn!(subsystem = "maintenance", op = "clear_logs", "Rejected log clear with bad secret");
            return Err(Error::Unauthorized("invalid maintenance secret".to_string()));
        }

        let events = self.event_log.clear().await?;
        let errors = self.error_log.clear().await?;
        self.notices.reset_all().await?;
        info!(
            subsystem = "maintenance",
            op = "clear_logs",
            events,
            errors,
            "Logs cleared"
        );
        Ok(ClearedLogs { events, errors })
    }
}

/// Constant-time comparison via MAC verification.
pub(crate) fn secrets_match(expected: &str, presented: &str) -> Result<bool> {
    let mut mac =
        HmacSha256::new_from_slice(expected.as_bytes()).map_err(|e| Error::Internal(e.to_string()))?;
    mac.update(b"datalayer-maintenance");
    let tag = mac.finalize().into_bytes();

    let mut check =
        HmacSha256::new_from_slice(presented.as_bytes()).map_err(|e| Error::Internal(e.to_string()))?;
    check.update(b"datalayer-maintenance");
    Ok(check.verify_slice(&tag).is_ok())
}
