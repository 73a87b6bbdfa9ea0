//! Logging setup for test runs

use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

/// Output format of the subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Compact human-readable lines
    #[default]
    Compact,
    /// One JSON object per event
    Json,
}

/// Filter directive for a `-v` count
#[must_use]
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "appium_harness=warn",
        1 => "appium_harness=info",
        2 => "appium_harness=debug",
        _ => "appium_harness=trace",
    }
}

/// Install a compact stderr subscriber.
///
/// `RUST_LOG` wins over `verbosity`. Returns `false` when a global subscriber
/// was already installed, which is the normal case for every test after the
/// first.
pub fn init_logging(verbosity: u8) -> bool {
    init_logging_with(verbosity, LogFormat::Compact)
}

/// Install a stderr subscriber in the given format
pub fn init_logging_with(verbosity: u8, format: LogFormat) -> bool {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    let stderr = std::io::stderr.with_max_level(tracing::Level::TRACE);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(stderr)
        .with_target(true)
        .with_level(true);

    match format {
        LogFormat::Compact => builder.compact().try_init().is_ok(),
        LogFormat::Json => builder.json().try_init().is_ok(),
    }
}
