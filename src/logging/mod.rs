//! Logging infrastructure - structured tracing for the arena
//!
//! Design: Uses `tracing` for structured, contextual logging with:
//! - Configurable log levels
//! - Zero-cost when disabled
//! - Console or file output, human-readable or JSON
//!
//! The arena only emits events. Installing a subscriber is up to the host;
//! [`init`] is a convenience for processes that don't have one.

use once_cell::sync::OnceCell;
use std::io;
use std::path::Path;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, MakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

use crate::backend::BackendError;
use crate::error::ArenaError;

/// Target used by every arena event
pub const TARGET: &str = "page_arena";

/// Global logging state
static LOGGER_INITIALIZED: OnceCell<()> = OnceCell::new();

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default log level
    pub level: Level,
    /// Enable file logging
    pub file_output: bool,
    /// Log file path (if file_output enabled)
    pub log_path: Option<String>,
    /// Enable JSON format (vs human-readable)
    pub json_format: bool,
    /// Show span events (enter/exit)
    pub show_spans: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            file_output: false,
            log_path: None,
            json_format: false,
            show_spans: false,
        }
    }
}

impl LogConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // PAGE_ARENA_LOG_LEVEL: trace, debug, info, warn, error
        if let Ok(level_str) = std::env::var("PAGE_ARENA_LOG_LEVEL") {
            config.level = parse_level(&level_str);
        }

        // PAGE_ARENA_LOG_FILE: path to log file
        if let Ok(path) = std::env::var("PAGE_ARENA_LOG_FILE") {
            config.file_output = true;
            config.log_path = Some(path);
        }

        config.json_format = std::env::var("PAGE_ARENA_LOG_JSON").is_ok();
        config.show_spans = std::env::var("PAGE_ARENA_LOG_SPANS").is_ok();

        config
    }

    /// Create high-performance config (errors only)
    pub fn performance() -> Self {
        Self {
            level: Level::ERROR,
            ..Self::default()
        }
    }

    /// Create debug config (every allocation and free)
    pub fn debug() -> Self {
        Self {
            level: Level::TRACE,
            file_output: true,
            log_path: Some("page_arena.log".to_string()),
            json_format: false,
            show_spans: true,
        }
    }
}

fn parse_level(value: &str) -> Level {
    match value.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Initialize logging with configuration from the environment
pub fn init() {
    init_with_config(LogConfig::from_env());
}

/// Initialize logging with custom configuration
///
/// Only the first call has an effect. If the host already installed a global
/// subscriber, that one is kept.
pub fn init_with_config(config: LogConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", TARGET, config.level.as_str().to_lowercase()))
        });

        let output = match config.log_path.as_deref().filter(|_| config.file_output) {
            Some(path) => file_writer(path).map_or_else(
                || fmt_layer(&config, io::stdout),
                |appender| fmt_layer(&config, appender),
            ),
            None => fmt_layer(&config, io::stdout),
        };

        tracing_subscriber::registry()
            .with(output)
            .with(env_filter)
            .try_init()
            .ok(); // Ignore error if already initialized
    });
}

fn file_writer(path: &str) -> Option<tracing_appender::rolling::RollingFileAppender> {
    let path = Path::new(path);
    let file_name = path.file_name()?;
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    Some(tracing_appender::rolling::never(dir, file_name))
}

fn fmt_layer<W>(config: &LogConfig, writer: W) -> Box<dyn Layer<Registry> + Send + Sync>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let span_events = if config.show_spans {
        FmtSpan::ENTER | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let layer = fmt::layer()
        .with_writer(writer)
        .with_span_events(span_events)
        .with_target(true)
        .with_thread_ids(cfg!(debug_assertions))
        .with_line_number(cfg!(debug_assertions));

    if config.json_format {
        layer.json().boxed()
    } else {
        layer.compact().boxed()
    }
}

/// Check if logging is initialized
pub fn is_initialized() -> bool {
    LOGGER_INITIALIZED.get().is_some()
}

// ============================================================================
// Arena events
// ============================================================================

/// Log arena creation
pub fn log_arena_init(base: *const u8, size: usize, page_size: usize, num_pages: u32) {
    use tracing::info;
    info!(
        target: TARGET,
        event = "arena_init",
        address = ?base,
        size_bytes = size,
        page_size,
        num_pages,
        "Arena reserved"
    );
}

/// Log arena teardown
pub fn log_arena_teardown(size: usize, outstanding_pages: u32) {
    use tracing::{info, warn};
    if outstanding_pages > 0 {
        warn!(
            target: TARGET,
            event = "arena_teardown",
            size_bytes = size,
            outstanding_pages,
            "Arena released with live allocations"
        );
    } else {
        info!(
            target: TARGET,
            event = "arena_teardown",
            size_bytes = size,
            "Arena released"
        );
    }
}

/// Log page allocation
#[inline]
pub fn log_allocation(ptr: *const u8, first_page: u32, pages: u32) {
    use tracing::trace;
    trace!(
        target: TARGET,
        event = "allocation",
        address = ?ptr,
        first_page,
        pages,
        "Pages allocated"
    );
}

/// Log page deallocation
#[inline]
pub fn log_deallocation(ptr: *const u8, first_page: u32, pages: u32) {
    use tracing::trace;
    trace!(
        target: TARGET,
        event = "deallocation",
        address = ?ptr,
        first_page,
        pages,
        "Pages freed"
    );
}

/// Log a request no free run could satisfy
pub fn log_exhausted(pages: u32, largest_free_run: u32) {
    use tracing::debug;
    debug!(
        target: TARGET,
        event = "exhausted",
        pages,
        largest_free_run,
        "No free run large enough"
    );
}

/// Log a rejected free (bad pointer, bad size, double free)
pub fn log_free_rejected(error: &ArenaError, addr: usize, size: usize) {
    use tracing::error;
    error!(
        target: TARGET,
        event = "free_rejected",
        address = addr,
        size_bytes = size,
        %error,
        "Arena free rejected"
    );
}

/// Log a backend reservation failure
pub fn log_backend_failure(error: &BackendError) {
    use tracing::error;
    error!(
        target: TARGET,
        event = "backend_failure",
        %error,
        "Couldn't reserve arena memory"
    );
}

/// Log any other arena error
pub fn log_arena_error(error: &ArenaError) {
    use tracing::error;
    error!(
        target: TARGET,
        event = "arena_error",
        %error,
        "Arena error"
    );
}
