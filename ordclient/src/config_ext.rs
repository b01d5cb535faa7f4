//! Client settings stored in the shared ordconfig file
//!
//! ```yaml
//! client:
//!   downloads:
//!     poll_interval_ms: 3000
//!   activity:
//!     recent_lines: 80
//!     capacity: 500
//!   library:
//!     top_genres: 15
//! ```

use anyhow::Result;
use ordconfig::Config;
use std::time::Duration;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 3000;
pub const DEFAULT_RECENT_LOG_LINES: u64 = 80;
/// The backend never returns more log lines than this
pub const MAX_RECENT_LOG_LINES: u64 = 200;
pub const DEFAULT_ACTIVITY_CAPACITY: u64 = 500;
pub const DEFAULT_TOP_GENRES: u64 = 15;

/// Extension trait for [`ordconfig::Config`]
pub trait ClientConfigExt {
    /// Delay between two downloads polls
    fn downloads_poll_interval(&self) -> Result<Duration>;
    fn set_downloads_poll_interval(&self, interval: Duration) -> Result<()>;

    /// Number of backend log lines fetched per refresh (capped at 200)
    fn recent_log_lines(&self) -> Result<usize>;

    /// Maximum number of lines kept in the activity log
    fn activity_capacity(&self) -> Result<usize>;

    /// Number of genre facets offered
    fn top_genres_count(&self) -> Result<usize>;
}

impl ClientConfigExt for Config {
    fn downloads_poll_interval(&self) -> Result<Duration> {
        let ms = self.persist_default_u64(
            &["client", "downloads", "poll_interval_ms"],
            DEFAULT_POLL_INTERVAL_MS,
        )?;
        Ok(Duration::from_millis(ms.max(1)))
    }

    fn set_downloads_poll_interval(&self, interval: Duration) -> Result<()> {
        self.set_value(
            &["client", "downloads", "poll_interval_ms"],
            serde_yaml::Value::Number((interval.as_millis() as u64).into()),
        )
    }

    fn recent_log_lines(&self) -> Result<usize> {
        let n = self.persist_default_u64(
            &["client", "activity", "recent_lines"],
            DEFAULT_RECENT_LOG_LINES,
        )?;
        Ok(n.min(MAX_RECENT_LOG_LINES) as usize)
    }

    fn activity_capacity(&self) -> Result<usize> {
        let n = self.persist_default_u64(
            &["client", "activity", "capacity"],
            DEFAULT_ACTIVITY_CAPACITY,
        )?;
        Ok(n as usize)
    }

    fn top_genres_count(&self) -> Result<usize> {
        let n =
            self.persist_default_u64(&["client", "library", "top_genres"], DEFAULT_TOP_GENRES)?;
        Ok(n as usize)
    }
}
