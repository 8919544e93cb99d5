//! Tracing subscriber setup for the binary

use tracing_subscriber::EnvFilter;

use crate::cli::Verbosity;

/// Default filter directive for a verbosity level
pub fn default_directive(verbosity: Verbosity) -> &'static str {
    match verbosity {
        Verbosity::Quiet => "error",
        Verbosity::Normal => "warn",
        Verbosity::Verbose => "reviewrag=info,warn",
        Verbosity::VeryVerbose => "reviewrag=debug,info",
    }
}

/// Install the global subscriber. `RUST_LOG` takes precedence over the
/// verbosity flags. Logs go to stderr so answers on stdout stay clean.
pub fn init(verbosity: Verbosity) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
