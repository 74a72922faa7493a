//! Tracing setup for the CLI.
//!
//! Output goes to stderr so transcribed sentences on stdout stay pipeable.
//! `MEDIVOICE_LOG` takes an `EnvFilter` directive and overrides the verbosity
//! flags.

use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Install the global subscriber once. Safe to call again (tests, repeated
/// setup paths); later calls are no-ops.
pub fn init_tracing(verbose: bool) {
    let _ = TRACING_INIT.get_or_init(|| {
        let default_directive = if verbose {
            "medivoice=debug"
        } else {
            "medivoice=info"
        };
        let filter = EnvFilter::try_from_env("MEDIVOICE_LOG")
            .unwrap_or_else(|_| EnvFilter::new(default_directive));
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}
