//! Logging configuration using tracing.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Directive applying `level` to this crate while keeping the HTTP stack
/// quiet below `warn`.
fn directive(level: &str) -> String {
    format!("warn,index_lifecycle={}", level)
}

/// Initialize logging on stderr, leaving stdout to the JSON reports.
/// `RUST_LOG` takes precedence over `level`.
pub fn init(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(directive(level)))
        .unwrap_or_else(|_| EnvFilter::new(directive("info")));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()?;

    Ok(())
}
