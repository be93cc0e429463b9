//! Event dispatch: client queue push plus best-effort Event Log write.
//!
//! The two writes are not transactional. The push is queued first and stays
//! queued whatever the log outcome; a failed log write is reported to the Error Log, and a failed
//! Error Log write is reported to the tracing output. Neither failure reaches
//! the shopper.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, warn};

use datalayer_core::{
    ErrorLogRepository, EventEnvelope, EventLogRepository, NewEventLogEntry, OutboundEventSink,
    Result,
};

/// Opening marker of an emitted push block.
pub const MARKUP_START: &str = "<!-- datalayer: Start Data Layer Event -->";

/// Closing marker of an emitted push block.
pub const MARKUP_END: &str = "<!-- datalayer: End Data Layer Event -->";

/// What happened to the log side of a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutcome {
    /// Row written with this id.
    Logged(i64),
    /// Event Log write failed; failure recorded in the Error Log.
    Escalated,
    /// Both writes failed; only the tracing output saw it.
    Dropped,
}

/// Dispatches envelopes and records operational errors.
#[derive(Clone)]
pub struct EventDispatcher {
    event_log: Arc<dyn EventLogRepository>,
    error_log: Arc<dyn ErrorLogRepository>,
}

impl EventDispatcher {
    pub fn new(event_log: Arc<dyn EventLogRepository>, error_log: Arc<dyn ErrorLogRepository>) -> Self {
        Self {
            event_log,
            error_log,
        }
    }

    /// Queue the push on `sink`, then log the envelope.
    pub async fn dispatch(&self, envelope: EventEnvelope, sink: &mut dyn OutboundEventSink) -> LogOutcome {
        sink.enqueue(envelope.clone());
        self.log(&envelope).await
    }

    /// Write one Event Log row for `envelope`, escalating failures.
    pub async fn log(&self, envelope: &EventEnvelope) -> LogOutcome {
        let start = Instant::now();
        let event_name = envelope.event.as_str();

        let result = match NewEventLogEntry::from_envelope(envelope) {
            Ok(entry) => self.event_log.append(entry).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(id) => {
                debug!(
                    subsystem = "pipeline",
                    component = "dispatcher",
                    op = "dispatch",
                    event_name,
                    id,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Event dispatched"
                );
                LogOutcome::Logged(id)
            }
            Err(e) => {
                warn!(
                    subsystem = "pipeline",
                    component = "dispatcher",
                    event_name,
                    error = %e,
                    "Event log write failed"
                );
                let message = format!("Failed to log {} event: {}", event_name, e);
                if self.record_error(&message).await {
                    LogOutcome::Escalated
                } else {
                    LogOutcome::Dropped
                }
            }
        }
    }

    /// Append to the Error Log. Returns false when the write itself failed.
    pub async fn record_error(&self, message: &str) -> bool {
        match self.error_log.append(message).await {
            Ok(_) => true,
            Err(e) => {
                error!(
                    subsystem = "pipeline",
                    component = "dispatcher",
                    op = "record_error",
                    error = %e,
                    dropped_message = message,
                    "Error log write failed, message dropped"
                );
                false
            }
        }
    }
}

/// Envelopes queued for the current response, flushed once in order.
#[derive(Debug, Default)]
pub struct PendingEvents {
    envelopes: Vec<EventEnvelope>,
}

impl PendingEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.envelopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.envelopes.is_empty()
    }

    /// Take every queued envelope, leaving the sink empty.
    pub fn drain(&mut self) -> Vec<EventEnvelope> {
        std::mem::take(&mut self.envelopes)
    }

    /// Render and drain every queued envelope as push markup.
    pub fn flush_markup(&mut self) -> Result<String> {
        let envelopes = self.drain();
        render_markup(&envelopes)
    }
}

impl OutboundEventSink for PendingEvents {
    fn enqueue(&mut self, envelope: EventEnvelope) {
        self.envelopes.push(envelope);
    }
}

/// One delimited script block per envelope, in playback order.
pub fn render_markup(envelopes: &[EventEnvelope]) -> Result<String> {
    let mut out = String::new();
    for envelope in envelopes {
        let json = serde_json::to_string(envelope)?;
        out.push_str(MARKUP_START);
        out.push('\n');
        out.push_str("<script type=\"text/javascript\">window.dataLayer = window.dataLayer || []; window.dataLayer.push(");
        out.push_str(&escape_script_json(&json));
        out.push_str(");</script>\n");
        out.push_str(MARKUP_END);
        out.push('\n');
    }
    Ok(out)
}

/// Keep serialized JSON from closing the surrounding script element.
fn escape_script_json(json: &str) -> String {
    json.replace('<', "\\u003c")
        .replace('>', "\\u003e")
        .replace('&', "\\u0026")
        .replace('\u{2028}', "\\u2028")
        .replace('\u{2029}', "\\u2029")
}

#[cfg(test)]
mod tests {
    use super::*;
    use datalayer_core::{EventModelBuilder, EventName, RequestContext, SiteIdentity};
    use datalayer_db::memory::{MemoryErrorLog, MemoryEventLog, MemoryNoticeState};

    fn ctx() -> RequestContext {
        RequestContext::new(SiteIdentity::new("https://shop.example", "Shop"), "EUR")
    }

    fn envelope(event: EventName) -> EventEnvelope {
        EventModelBuilder::new(event).build(&ctx())
    }

    fn dispatcher() -> (EventDispatcher, Arc<MemoryEventLog>, Arc<MemoryErrorLog>) {
        let events = Arc::new(MemoryEventLog::new());
        let errors = Arc::new(MemoryErrorLog::new(Arc::new(MemoryNoticeState::new())));
        (EventDispatcher::new(events.clone(), errors.clone()), events, errors)
    }

    #[tokio::test]
    async fn test_dispatch_pushes_and_logs_once() {
        let (dispatcher, events, _) = dispatcher();
        let mut sink = PendingEvents::new();

        let outcome = dispatcher.dispatch(envelope(EventName::ViewItem), &mut sink).await;

        assert!(matches!(outcome, LogOutcome::Logged(_)));
        assert_eq!(sink.len(), 1);
        let rows = events.recent(10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].event_name, "view_item");
    }

    #[tokio::test]
    async fn test_log_failure_still_pushes_and_escalates() {
        let (dispatcher, events, errors) = dispatcher();
        events.set_failing(true);
        let mut sink = PendingEvents::new();

        let outcome = dispatcher.dispatch(envelope(EventName::AddToCart), &mut sink).await;

        assert_eq!(outcome, LogOutcome::Escalated);
        assert_eq!(sink.len(), 1);
        let logged = errors.recent(1).await.unwrap();
        assert!(logged[0].error_message.contains("add_to_cart"));
    }

    #[tokio::test]
    async fn test_double_failure_is_dropped_without_panic() {
        let (dispatcher, events, errors) = dispatcher();
        events.set_failing(true);
        errors.set_failing(true);
        let mut sink = PendingEvents::new();

        let outcome = dispatcher.dispatch(envelope(EventName::Purchase), &mut sink).await;
        assert_eq!(outcome, LogOutcome::Dropped);
        assert_eq!(sink.len(), 1);
    }

    /// Sink that takes the Event Log offline as soon as something is pushed.
    struct OfflineAfterPush {
        events: Arc<MemoryEventLog>,
        pushed: Vec<EventEnvelope>,
    }

    impl OutboundEventSink for OfflineAfterPush {
        fn enqueue(&mut self, envelope: EventEnvelope) {
            self.events.set_failing(true);
            self.pushed.push(envelope);
        }
    }

    #[tokio::test]
    async fn test_push_is_queued_before_log_write() {
        let (dispatcher, events, errors) = dispatcher();
        let mut sink = OfflineAfterPush {
            events: events.clone(),
            pushed: Vec::new(),
        };

        let outcome = dispatcher.dispatch(envelope(EventName::ViewItem), &mut sink).await;

        assert_eq!(outcome, LogOutcome::Escalated);
        assert_eq!(sink.pushed.len(), 1);
        assert_eq!(errors.count().await.unwrap(), 1);
    }

    #[test]
    fn test_markup_preserves_order_and_markers() {
        let mut sink = PendingEvents::new();
        sink.enqueue(envelope(EventName::ViewCart));
        sink.enqueue(envelope(EventName::BeginCheckout));

        let markup = sink.flush_markup().unwrap();
        assert!(sink.is_empty());
        assert_eq!(markup.matches(MARKUP_START).count(), 2);
        assert_eq!(markup.matches(MARKUP_END).count(), 2);
        let first = markup.find("\"view_cart\"").unwrap();
        let second = markup.find("\"begin_checkout\"").unwrap();
        assert!(first < second);
        assert!(markup.contains("window.dataLayer.push({"));
    }

    #[test]
    fn test_markup_escapes_script_breakout() {
        let envelope = EventModelBuilder::new(EventName::Search)
            .extra("search_term", "</script><script>alert(1)</script>")
            .build(&ctx());
        let markup = render_markup(&[envelope]).unwrap();
        assert!(!markup.contains("</script><script>alert"));
        assert_eq!(markup.matches("</script>").count(), 1);
    }

    #[test]
    fn test_escaped_json_still_parses() {
        let envelope = EventModelBuilder::new(EventName::ApplyCoupon)
            .extra("coupon", "A&B<C>")
            .build(&ctx());
        let json = serde_json::to_string(&envelope).unwrap();
        let escaped = escape_script_json(&json);
        let decoded: EventEnvelope = serde_json::from_str(&escaped).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn test_empty_sink_renders_nothing() {
        assert_eq!(PendingEvents::new().flush_markup().unwrap(), "");
    }
}
