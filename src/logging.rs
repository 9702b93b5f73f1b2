use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable holding the log filter, e.g. `MARKSD_LOG=marksd=debug`.
pub const LOG_ENV: &str = "MARKSD_LOG";

/// Installs the global subscriber. Output goes to stderr; stdout is reserved
/// for IPC responses.
pub fn init() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    // Already initialised in-process is fine.
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_ansi(false)
        .try_init();
}
