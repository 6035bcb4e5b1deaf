//! Tracing subscriber setup.
//!
//! Library crates log through the `log` facade; the subscriber picks those
//! records up as well.  Output goes to stderr so it never interleaves with
//! the display on stdout.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Filter from `RUST_LOG` if set, else `level`.
pub fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Install the global subscriber.  Fails if one is already installed.
pub fn init_logging(level: &str) -> Result<(), String> {
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    let layer = if cfg!(feature = "logs-json") {
        layer.json().boxed()
    } else {
        layer.compact().boxed()
    };

    tracing_subscriber::registry()
        .with(build_filter(level))
        .with(layer)
        .try_init()
        .map_err(|e| format!("failed to install logger: {}", e))?;

    tracing::debug!(level = %level, "logging initialised");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_accepts_directives() {
        let filter = build_filter("climalink=debug,warn");
        assert!(!filter.to_string().is_empty());
    }
}
