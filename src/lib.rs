//! Collective-intelligence coordination for independently invoked request handlers.
//!
//! Three cooperating pieces give many handlers a shared, eventually-consistent view
//! of cross-user regularities without a coordinator on the request path:
//!
//! | Component | Role |
//! |-----------|------|
//! | [`bus::MessageBus`] | Per-agent FIFO mailboxes, broadcast fan-out, wisdom exchange log |
//! | [`emergence::PatternEngine`] | Aggregates observations into candidates and promotes recurring element sets to durable patterns |
//! | [`cache::FieldCache`] | Two-tier expiring cache for expensive derived context |
//!
//! # Architecture
//!
//! - **Storage**: SQLite behind the [`store`] collaborator traits; the in-memory
//!   path is authoritative and storage failures degrade, never propagate
//! - **Background work**: periodic candidate and cache sweeps on tokio, stopped
//!   when their owner is dropped
//! - **Wiring**: [`collective::Collective`] builds explicit, injectable instances
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from TOML files and environment variables
//! - [`db`]: SQLite database initialization, schema, migrations, and health checks
//! - [`store`]: Storage collaborator traits and their SQLite implementation
//! - [`bus`], [`emergence`], [`cache`]: the three coordination components

pub mod bus;
pub mod cache;
pub mod collective;
pub mod config;
pub mod db;
pub mod emergence;
pub mod error;
pub mod store;
pub mod sweep;
