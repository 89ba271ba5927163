use tracing_subscriber::{filter::LevelFilter, prelude::*, EnvFilter};

/// Install a compact stderr subscriber.
///
/// `RUST_LOG` wins when set; otherwise everything at `info` and above is shown.
pub fn init() {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();
    let filter_layer = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}
