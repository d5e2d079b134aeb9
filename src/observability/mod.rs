//! Observability module providing structured logging.
//!
//! Log output is produced with `tracing` throughout the crate; this module
//! installs the subscriber that formats and filters it.

mod tracing_init;

pub use tracing_init::*;
