use anyhow::Result;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Environment variable selecting the log level (trace, debug, info, warn, error).
pub const LOG_LEVEL_VAR: &str = "LOG_LEVEL";

/// Maps a `LOG_LEVEL` value to a tracing level, defaulting to INFO.
pub fn parse_level(value: &str) -> Level {
    match value.trim().to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Installs the global fmt subscriber.
pub fn init() -> Result<()> {
    let level = std::env::var(LOG_LEVEL_VAR)
        .map(|v| parse_level(&v))
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
