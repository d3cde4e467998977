//! # Pomelo Observe - Logging Setup
//!
//! Structured logging initialization with contextual fields and
//! format options.

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// Log output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format with colors (for development)
    Pretty,
    /// Compact format without colors
    Compact,
    /// JSON format (for production)
    Json,
}

impl Default for LogFormat {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            LogFormat::Pretty
        } else {
            LogFormat::Json
        }
    }
}

/// Configuration for logging behavior.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Output format
    pub format: LogFormat,
    /// Whether to include target module
    pub include_target: bool,
    /// Whether to log span events (enter/exit/close)
    pub log_spans: bool,
    /// Environment filter (e.g., "info,pomelo=debug")
    pub filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            include_target: true,
            log_spans: cfg!(debug_assertions),
            filter: None,
        }
    }
}

/// Initialize structured logging with configuration.
pub fn init_logging(config: LogConfig) -> anyhow::Result<()> {
    let env_filter = if let Some(filter) = config.filter {
        EnvFilter::try_new(filter)?
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,pomelo=debug"))
    };

    let fmt_span = if config.log_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(config.include_target)
        .with_span_events(fmt_span);

    match config.format {
        LogFormat::Pretty => subscriber.pretty().try_init(),
        LogFormat::Compact => subscriber.compact().try_init(),
        LogFormat::Json => subscriber.json().try_init(),
    }
    .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))?;

    Ok(())
}
