use tracing_subscriber::EnvFilter;

/// Install the stderr `tracing` subscriber for the binary.
///
/// The filter comes from `RUST_LOG`; without it only warnings are shown so
/// log lines do not fight with the progress spinner.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
