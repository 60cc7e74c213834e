use anyhow::anyhow;

/// `RUST_LOG` directives when set and valid, `info` otherwise.
fn default_filter(directives: Option<&str>) -> tracing_subscriber::EnvFilter {
    use tracing_subscriber::EnvFilter;

    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

/// Install the global tracing subscriber.
///
/// Logs go to stderr so G-code written to stdout stays clean. `RUST_LOG`
/// replaces the default `info` level, so it can narrow or widen it. Fails if
/// a subscriber is already installed.
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let env_filter = default_filter(std::env::var("RUST_LOG").ok().as_deref());
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| anyhow!("install tracing subscriber: {e}"))
}
