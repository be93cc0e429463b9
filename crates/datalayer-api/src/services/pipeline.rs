//! Single entry point for storefront lifecycle triggers.

use datalayer_core::{
    format_listing, view_item_list_envelope, EventEnvelope, LifecycleEvent, OutboundEventSink,
    RequestContext, Result,
};
use tracing::trace;

use super::dispatcher::{EventDispatcher, LogOutcome};
use super::list_cache::ListCache;

/// Builds envelopes for lifecycle triggers and dispatches them.
#[derive(Clone)]
pub struct EventPipeline {
    dispatcher: EventDispatcher,
    list_cache: ListCache,
}

impl EventPipeline {
    pub fn new(dispatcher: EventDispatcher, list_cache: ListCache) -> Self {
        Self {
            dispatcher,
            list_cache,
        }
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    pub fn list_cache(&self) -> &ListCache {
        &self.list_cache
    }

    /// Build the envelope for `kind`, using the list cache for listing views.
    pub async fn build_envelope(&self, kind: &LifecycleEvent, ctx: &RequestContext) -> Result<EventEnvelope> {
        match kind {
            LifecycleEvent::ViewItemList { listing, products } => {
                let key = ListCache::cache_key(listing, &ctx.currency);
                let items = self
                    .list_cache
                    .get_or_compute(&key, None, || async {
                        trace!(subsystem = "pipeline", item_count = products.len(), "Formatting listing");
                        Ok(format_listing(products))
                    })
                    .await?;
                Ok(view_item_list_envelope(items, ctx))
            }
            other => Ok(other.build_envelope(ctx)),
        }
    }

    /// Handle one trigger: build its envelope, push it to `sink`, log it.
    pub async fn handle_lifecycle_event(
        &self,
        kind: &LifecycleEvent,
        ctx: &RequestContext,
        sink: &mut dyn OutboundEventSink,
    ) -> Result<LogOutcome> {
        let envelope = self.build_envelope(kind, ctx).await?;
        Ok(self.dispatcher.dispatch(envelope, sink).await)
    }
}
