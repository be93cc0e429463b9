//! In-memory repository implementations.
//!
//! Used by tests and by single-process deployments without PostgreSQL.
//! Each store can be switched into a failing mode to simulate an
//! unavailable backend.
//!
//! ```rust
//! use std::sync::Arc;
//! use datalayer_db::memory::{MemoryErrorLog, MemoryNoticeState};
//!
//! let notices = Arc::new(MemoryNoticeState::new());
//! let errors = MemoryErrorLog::new(notices.clone());
//! ```

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use datalayer_core::{
    page_offset, Error, ErrorLogEntry, ErrorLogRepository, EventLogEntry, EventLogRepository,
    LogPage, NewEventLogEntry, NoticeStateRepository, Product, ProductCatalog, Result,
};

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| Error::Internal("in-memory store lock poisoned".to_string()))
}

fn unavailable(store: &str) -> Error {
    Error::Internal(format!("{} unavailable", store))
}

/// Newest-first slice of `rows` for a 1-based page.
fn page_newest_first<T: Clone>(rows: &[T], page: i64, page_size: i64) -> Vec<T> {
    let offset = usize::try_from(page_offset(page, page_size)).unwrap_or(usize::MAX);
    let limit = usize::try_from(page_size.max(0)).unwrap_or(usize::MAX);
    rows.iter()
        .rev()
        .skip(offset)
        .take(limit)
        .cloned()
        .collect()
}

// =============================================================================
// EVENT LOG
// =============================================================================

/// In-memory Event Log.
#[derive(Default)]
pub struct MemoryEventLog {
    rows: Mutex<Vec<EventLogEntry>>,
    // Last issued id; never rewound by `clear`.
    last_id: AtomicI64,
    failing: AtomicBool,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(unavailable("event log"));
        }
        Ok(())
    }
}

#[async_trait]
impl EventLogRepository for MemoryEventLog {
    async fn append(&self, entry: NewEventLogEntry) -> Result<i64> {
        self.check()?;
        let mut rows = lock(&self.rows)?;
        let id = self.last_id.fetch_add(1, Ordering::SeqCst) + 1;
        rows.push(EventLogEntry {
            id,
            event_time: Utc::now(),
            event_name: entry.event_name,
            user_id: entry.user_id,
            user_role: entry.user_role,
            event_data: entry.event_data,
        });
        Ok(id)
    }

    async fn recent(&self, limit: i64) -> Result<Vec<EventLogEntry>> {
        self.check()?;
        let rows = lock(&self.rows)?;
        Ok(page_newest_first(&rows, 1, limit))
    }

    async fn paginate(&self, page: i64, page_size: i64) -> Result<LogPage<EventLogEntry>> {
        self.check()?;
        let rows = lock(&self.rows)?;
        Ok(LogPage {
            logs: page_newest_first(&rows, page, page_size),
            total: rows.len() as i64,
        })
    }

    async fn count(&self) -> Result<i64> {
        self.check()?;
        Ok(lock(&self.rows)?.len() as i64)
    }

    async fn clear(&self) -> Result<u64> {
        self.check()?;
        let mut rows = lock(&self.rows)?;
        let removed = rows.len() as u64;
        rows.clear();
        Ok(removed)
    }
}

// =============================================================================
// ERROR LOG + NOTICE STATE
// =============================================================================

/// In-memory dismissal flags.
#[derive(Default)]
pub struct MemoryNoticeState {
    dismissed: Mutex<HashSet<String>>,
}

impl MemoryNoticeState {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NoticeStateRepository for MemoryNoticeState {
    async fn is_dismissed(&self, admin_id: &str) -> Result<bool> {
        Ok(lock(&self.dismissed)?.contains(admin_id))
    }

    async fn dismiss(&self, admin_id: &str) -> Result<()> {
        lock(&self.dismissed)?.insert(admin_id.to_string());
        Ok(())
    }

    async fn reset_all(&self) -> Result<()> {
        lock(&self.dismissed)?.clear();
        Ok(())
    }
}

/// In-memory Error Log; appending resets the shared notice state.
pub struct MemoryErrorLog {
    rows: Mutex<Vec<ErrorLogEntry>>,
    last_id: AtomicI64,
    notices: Arc<MemoryNoticeState>,
    failing: AtomicBool,
}

impl MemoryErrorLog {
    pub fn new(notices: Arc<MemoryNoticeState>) -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            last_id: AtomicI64::new(0),
            notices,
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(unavailable("error log"));
        }
        Ok(())
    }
}

#[async_trait]
impl ErrorLogRepository for MemoryErrorLog {
    async fn append(&self, message: &str) -> Result<i64> {
        self.check()?;
        let id = {
            let mut rows = lock(&self.rows)?;
            let id = self.last_id.fetch_add(1, Ordering::SeqCst) + 1;
            rows.push(ErrorLogEntry {
                id,
                error_time: Utc::now(),
                error_message: message.to_string(),
            });
            id
        };
        self.notices.reset_all().await?;
        Ok(id)
    }

    async fn recent(&self, limit: i64) -> Result<Vec<ErrorLogEntry>> {
        self.check()?;
        let rows = lock(&self.rows)?;
        Ok(page_newest_first(&rows, 1, limit))
    }

    async fn paginate(&self, page: i64, page_size: i64) -> Result<LogPage<ErrorLogEntry>> {
        self.check()?;
        let rows = lock(&self.rows)?;
        Ok(LogPage {
            logs: page_newest_first(&rows, page, page_size),
            total: rows.len() as i64,
        })
    }

    async fn count(&self) -> Result<i64> {
        self.check()?;
        Ok(lock(&self.rows)?.len() as i64)
    }

    async fn clear(&self) -> Result<u64> {
        self.check()?;
        let mut rows = lock(&self.rows)?;
        let removed = rows.len() as u64;
        rows.clear();
        Ok(removed)
    }
}

// =============================================================================
// CATALOG
// =============================================================================

/// In-memory product catalog.
#[derive(Default)]
pub struct MemoryCatalog {
    products: Mutex<BTreeMap<u64, Product>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the catalog with products.
    pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let catalog = Self::new();
        if let Ok(mut map) = catalog.products.lock() {
            map.extend(products.into_iter().map(|p| (p.id, p)));
        }
        catalog
    }
}

#[async_trait]
impl ProductCatalog for MemoryCatalog {
    async fn get(&self, id: u64) -> Result<Option<Product>> {
        Ok(lock(&self.products)?.get(&id).cloned())
    }

    async fn upsert(&self, product: &Product) -> Result<()> {
        lock(&self.products)?.insert(product.id, product.clone());
        Ok(())
    }
}
