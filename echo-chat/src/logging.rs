/// Installs the global `tracing` subscriber. `RUST_LOG` wins over `default`.
///
/// Logs go to stderr; stdout is reserved for the `> ` console display.
pub fn init_tracing(default: &str) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
