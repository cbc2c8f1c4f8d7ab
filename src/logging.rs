use std::fs;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_DIRECTIVE: &str = "scoreboard=info";

/// Initializes the logging system with both console and file output.
///
/// Console output is human-readable; `logs/scoreboard.log.<date>` gets JSON
/// lines. `RUST_LOG` overrides the default `scoreboard=info` filter.
pub fn init_logging() {
    let _ = fs::create_dir_all("logs");

    let file_appender = tracing_appender::rolling::daily("logs", "scoreboard.log");
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer().json().with_writer(non_blocking_writer);
    let console_layer = fmt::layer().with_writer(std::io::stderr);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init();

    // The guard flushes the file writer on drop; keep it for the process lifetime
    std::mem::forget(guard);
}
