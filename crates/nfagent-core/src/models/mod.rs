//! Data models: configuration, the invoice record and per-thread session state.

pub mod config;
pub mod record;
pub mod session;
