//! Logging setup using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the filter:
//! 1. `--verbose` (debug for this crate)
//! 2. `BATCHPIPE_LOG` environment variable (any `EnvFilter` directive)
//! 3. default to `info`
//!
//! Logs go to stderr so stdout stays free for command output.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter
pub const LOG_ENV: &str = "BATCHPIPE_LOG";

/// Build the filter the subscriber is installed with
pub fn filter(verbose: bool) -> EnvFilter {
    if verbose {
        return EnvFilter::new("batchpipe=debug,info");
    }
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialise the global logging subscriber. Call once at startup.
pub fn init_logging(verbose: bool) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(filter(verbose))
        .with_target(verbose)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))
}
