use std::io;
use log::LevelFilter;
use fern::colors::{ColoredLevelConfig, Color};
use anyhow::Result;

/// Log configuration options
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level for console output
    pub console_level: LevelFilter,
    /// Log level for file output
    pub file_level: LevelFilter,
    /// Path to log file (None means no file logging)
    pub log_file: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            console_level: LevelFilter::Info,
            file_level: LevelFilter::Debug,
            log_file: None,
        }
    }
}

/// Initialize the logging system with the provided configuration
pub fn init(config: LogConfig) -> Result<()> {
    let colors = ColoredLevelConfig::new()
        .error(Color::Red)
        .warn(Color::Yellow)
        .info(Color::Green)
        .debug(Color::Blue)
        .trace(Color::Magenta);

    // Toasts get their own short prefix so they read like messages, not diagnostics
    let base_config = fern::Dispatch::new()
        .format(move |out, message, record| {
            if record.target() == "noticeboard::toast" {
                out.finish(format_args!("[{}] {}", colors.color(record.level()), message))
            } else {
                out.finish(format_args!(
                    "{} [{}] [{}] {}",
                    chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                    record.target(),
                    colors.color(record.level()),
                    message
                ))
            }
        })
        .level(LevelFilter::Trace)
        // Connection chatter from the HTTP and SQLite layers
        .level_for("sqlx", LevelFilter::Warn)
        .level_for("hyper", LevelFilter::Info)
        .level_for("reqwest", LevelFilter::Info);

    let console_config = fern::Dispatch::new()
        .level(config.console_level)
        .chain(io::stderr());

    let mut log_config = base_config.chain(console_config);

    if let Some(log_file) = config.log_file {
        let file_config = fern::Dispatch::new()
            .level(config.file_level)
            .chain(fern::log_file(log_file)?);

        log_config = log_config.chain(file_config);
    }

    log_config.apply()?;

    Ok(())
}

/// Utility function to convert a string to a log level
pub fn parse_log_level(level: &str) -> LevelFilter {
    match level.trim().to_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" | "warning" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info, // Default to Info for unrecognized levels
    }
}
