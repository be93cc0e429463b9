//! Core traits for datalayer abstractions.
//!
//! These traits define the interfaces that concrete implementations
//! must satisfy, enabling pluggable backends and testability.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// LOG STORES
// =============================================================================

/// Append-only store of dispatched envelopes.
#[async_trait]
pub trait EventLogRepository: Send + Sync {
    /// Append one row; id and timestamp are assigned by the store.
    async fn append(&self, entry: NewEventLogEntry) -> Result<i64>;

    /// Newest rows first.
    async fn recent(&self, limit: i64) -> Result<Vec<EventLogEntry>>;

    /// One page (1-based) of rows, newest first, plus the table total.
    async fn paginate(&self, page: i64, page_size: i64) -> Result<LogPage<EventLogEntry>>;

    /// Total number of rows.
    async fn count(&self) -> Result<i64>;

    /// Remove every row. Irreversible.
    async fn clear(&self) -> Result<u64>;
}

/// Append-only store of operational errors.
///
/// Appending must also reset every administrator's dismissed flag so the
/// operator notice reappears.
#[async_trait]
pub trait ErrorLogRepository: Send + Sync {
    async fn append(&self, message: &str) -> Result<i64>;

    async fn recent(&self, limit: i64) -> Result<Vec<ErrorLogEntry>>;

    async fn paginate(&self, page: i64, page_size: i64) -> Result<LogPage<ErrorLogEntry>>;

    async fn count(&self) -> Result<i64>;

    async fn clear(&self) -> Result<u64>;
}

/// Per-administrator "errors dismissed" acknowledgment.
#[async_trait]
pub trait NoticeStateRepository: Send + Sync {
    async fn is_dismissed(&self, admin_id: &str) -> Result<bool>;

    async fn dismiss(&self, admin_id: &str) -> Result<()>;

    /// Clear every acknowledgment.
    async fn reset_all(&self) -> Result<()>;
}

// =============================================================================
// CATALOG
// =============================================================================

/// Product lookup used by the client bridge.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn get(&self, id: u64) -> Result<Option<Product>>;

    /// Insert or replace a product snapshot.
    async fn upsert(&self, product: &Product) -> Result<()>;
}

// =============================================================================
// CACHE
// =============================================================================

/// Shared key/value cache backing the list cache.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Delete every key starting with `prefix`; returns the number removed.
    async fn delete_prefix(&self, prefix: &str) -> Result<u64>;
}

// =============================================================================
// OUTBOUND EVENTS
// =============================================================================

/// Per-response output channel for client queue pushes.
///
/// The rendering layer drains the sink once per response and emits the
/// envelopes in enqueue order.
pub trait OutboundEventSink: Send {
    fn enqueue(&mut self, envelope: EventEnvelope);
}

impl OutboundEventSink for Vec<EventEnvelope> {
    fn enqueue(&mut self, envelope: EventEnvelope) {
        self.push(envelope);
    }
}

/// 1-based page number to row offset; pages below 1 are treated as 1.
///
/// Saturates at `i64::MAX`, so an out-of-range page reads as empty.
pub fn page_offset(page: i64, page_size: i64) -> i64 {
    (page.max(1) - 1).saturating_mul(page_size.max(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_offset() {
        assert_eq!(page_offset(1, 10), 0);
        assert_eq!(page_offset(2, 10), 10);
        assert_eq!(page_offset(0, 10), 0);
        assert_eq!(page_offset(-3, 10), 0);
        assert_eq!(page_offset(3, 0), 0);
    }

    #[test]
    fn test_page_offset_saturates_for_huge_pages() {
        assert_eq!(page_offset(i64::MAX, 10), i64::MAX);
        assert_eq!(page_offset(i64::MAX / 2, 50), i64::MAX);
        assert_eq!(page_offset(i64::MAX, 1), i64::MAX - 1);
    }
}
