//! Calendar sync and bot dispatch engine.
//!
//! Each tick refreshes account credentials, reconciles every connected
//! calendar into local meeting records and sends recording bots into
//! meetings that are about to start.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod models;
pub mod providers;
pub mod scheduler;
pub mod schema;
pub mod status;
pub mod store;
pub mod sync;

#[cfg(test)]
mod testing;

pub use config::{EngineConfig, SyncConfig};
pub use engine::{SyncEngine, TickReport};
pub use store::Store;
