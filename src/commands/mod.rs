//! Command implementations
//!
//! Each module corresponds to an operation exposed by the CLI.

pub mod export;

// Re-export commonly used types
pub use export::{
    exit_code, run as export_run, ExportSummary, Exporter, EXIT_FAILURE, EXIT_INVALID_CHANNEL,
};
