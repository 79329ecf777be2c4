//! Tracing bootstrap.
//!
//! Filter directives come from `TALLY_LOG` (e.g. `TALLY_LOG=tally_storage=debug`),
//! falling back to the directive passed by the caller.

use tracing_subscriber::{fmt, EnvFilter};

use crate::constants::LOG_ENV_VAR;

/// Install a global `fmt` subscriber. Returns false if one was already set.
pub fn init_tracing(default_directive: &str) -> bool {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
