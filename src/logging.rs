//! Tracing setup for the `worldlink` binary

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable text
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Maps a `-v` count to a level name (0=warn, 1=info, 2=debug, 3+=trace)
pub fn level_for(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Default filter for a verbosity level.
///
/// Status lines on `worldlink::status` are always shown at info so the log
/// fallback stays visible without `-v`.
pub fn default_filter(verbosity: u8) -> String {
    let level = level_for(verbosity);
    let status_level = if verbosity == 0 { "info" } else { level };
    format!(
        "worldlink={level},worldlink_client={level},worldlink_protocol={level},worldlink::status={status_level}",
    )
}

/// Initializes logging to stderr. `RUST_LOG` overrides the verbosity.
pub fn init_logging(verbosity: u8, format: LogFormat) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbosity)));

    match format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_file(verbosity >= 2)
                    .with_line_number(verbosity >= 2),
            )
            .try_init()?,
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels() {
        assert_eq!(level_for(0), "warn");
        assert_eq!(level_for(1), "info");
        assert_eq!(level_for(2), "debug");
        assert_eq!(level_for(9), "trace");
    }

    #[test]
    fn test_status_target_visible_by_default() {
        let filter = default_filter(0);
        assert!(filter.contains("worldlink::status=info"));
        assert!(filter.contains("worldlink_client=warn"));
        assert!(EnvFilter::try_new(&filter).is_ok());
        assert!(default_filter(3).contains("worldlink::status=trace"));
    }
}
