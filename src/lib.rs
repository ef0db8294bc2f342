//! Discord Channel Exporter Library
//!
//! This library provides tools to:
//! - Resolve a Discord text channel and walk its full message history
//! - Export messages and embed metadata to plain-text logs
//! - Download message attachments and embed images/thumbnails
//! - Expose Prometheus metrics about an export run

pub mod chat;
pub mod config;
pub mod download;
pub mod error;
pub mod export;
pub mod integrations;
pub mod metrics;
pub mod models;
pub mod session;

// Re-export common types
pub use config::Config;
pub use error::{Error, Result};
pub use integrations::DiscordClient;
pub use session::ExportLock;

// Commands module uses re-exported types, so it must be declared after the re-exports
pub mod commands;
