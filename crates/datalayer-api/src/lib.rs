//! datalayer-api - HTTP surface of the datalayer event bridge.

pub mod app;
pub mod config;
pub mod services;
