//! Tracing setup with a runtime-adjustable level

use crate::error::{Error, Result};
use ordconfig::Config;
use std::sync::{Arc, OnceLock, RwLock};
use tracing::Level;
use tracing_subscriber::{
    filter::LevelFilter,
    layer::SubscriberExt,
    reload,
    util::SubscriberInitExt,
    Registry,
};

static LOG_CONTROL: OnceLock<LogControl> = OnceLock::new();

/// Handle on the installed subscriber's level filter
#[derive(Clone)]
pub struct LogControl {
    max_level: Arc<RwLock<Level>>,
    reload_handle: reload::Handle<LevelFilter, Registry>,
}

impl std::fmt::Debug for LogControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogControl")
            .field("max_level", &self.max_level())
            .finish()
    }
}

impl LogControl {
    pub fn max_level(&self) -> Level {
        *self
            .max_level
            .read()
            .unwrap_or_else(|e| e.into_inner())
    }

    /// Change the level filter (`ERROR`, `WARN`, `INFO`, `DEBUG`, `TRACE`)
    pub fn set_level(&self, level: &str) -> Result<()> {
        let level = string_to_level(level)
            .ok_or_else(|| Error::other(format!("Invalid log level: {}", level)))?;
        self.reload_handle
            .reload(level_to_levelfilter(level))
            .map_err(|e| Error::other(format!("Failed to reload log level filter: {}", e)))?;
        *self
            .max_level
            .write()
            .unwrap_or_else(|e| e.into_inner()) = level;
        tracing::info!("Log level changed to: {}", level);
        Ok(())
    }
}

/// Install the global tracing subscriber
///
/// The initial level comes from `logger.min_level`, console output from
/// `logger.enable_console`. Later calls return the first handle.
pub fn init_logging(config: &Config) -> LogControl {
    LOG_CONTROL
        .get_or_init(|| {
            let level = config
                .get_log_min_level()
                .ok()
                .and_then(|l| string_to_level(&l))
                .unwrap_or(Level::INFO);
            let enable_console = config.get_log_enable_console().unwrap_or(true);

            let (filter, reload_handle) = reload::Layer::new(level_to_levelfilter(level));
            let console = enable_console.then(|| {
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_level(true)
            });

            if let Err(e) = Registry::default().with(filter).with(console).try_init() {
                eprintln!("Tracing subscriber already installed: {}", e);
            }

            LogControl {
                max_level: Arc::new(RwLock::new(level)),
                reload_handle,
            }
        })
        .clone()
}

fn string_to_level(s: &str) -> Option<Level> {
    match s.trim().to_uppercase().as_str() {
        "ERROR" => Some(Level::ERROR),
        "WARN" | "WARNING" => Some(Level::WARN),
        "INFO" => Some(Level::INFO),
        "DEBUG" => Some(Level::DEBUG),
        "TRACE" => Some(Level::TRACE),
        _ => None,
    }
}

fn level_to_levelfilter(level: Level) -> LevelFilter {
    match level {
        Level::ERROR => LevelFilter::ERROR,
        Level::WARN => LevelFilter::WARN,
        Level::INFO => LevelFilter::INFO,
        Level::DEBUG => LevelFilter::DEBUG,
        Level::TRACE => LevelFilter::TRACE,
    }
}
