//! Command-line interface for xblsync.

mod commands;
pub mod progress;

pub use commands::{is_verbose, run, EXIT_CHANGES, EXIT_FATAL, EXIT_NO_CHANGES};
