//! # datalayer-core
//!
//! Core types, formatters, and abstractions for the datalayer event bridge.
//!
//! This crate turns storefront objects into canonical item records and event
//! envelopes, and defines the storage, catalog and cache traits the other
//! datalayer crates implement.
//!
//! ## Log level contract
//!
//! Every crate logs through `tracing` with `subsystem`, `component` and `op`
//! fields.
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service needing operator attention, including dropped Error Log writes |
//! | WARN  | Recoverable issue with a fallback applied (cache offline, log write skipped) |
//! | INFO  | Startup, shutdown and operator actions such as clearing logs |
//! | DEBUG | Cache hit/miss, dispatched events, rejected bridge calls |
//! | TRACE | Per-item iteration |

pub mod error;
pub mod formatter;
pub mod identity;
pub mod lifecycle;
pub mod models;
pub mod money;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use formatter::{format_product_item, EventModelBuilder, DEFAULT_EVENT_SOURCE, DEFAULT_LIST_NAME};
pub use identity::{Actor, RequestContext, ResolvedIdentity, SiteIdentity};
pub use lifecycle::{format_listing, generate_transaction_id, view_item_list_envelope, LifecycleEvent};
pub use models::*;
pub use traits::*;
