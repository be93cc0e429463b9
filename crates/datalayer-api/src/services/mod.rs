//! Service layer for the event pipeline.

pub mod bridge;
pub mod dispatcher;
pub mod list_cache;
pub mod maintenance;
pub mod pipeline;
pub mod tokens;

pub use bridge::{BridgeRequest, BridgeResponse, ClientBridge, ShopContext};
pub use dispatcher::{EventDispatcher, LogOutcome, PendingEvents};
pub use list_cache::ListCache;
pub use maintenance::MaintenanceService;
pub use pipeline::EventPipeline;
pub use tokens::{BridgeTokens, TokenClaims};
