//! Downloads and conversion jobs
//!
//! Conversions run on the backend; the client learns about their progress
//! by polling. A poll replaces the cached download list only when it
//! changed materially (different length, or a different `conv_status` at
//! some position), so subscribers are not woken for size or timestamp
//! churn.

use crate::error::{Error, Result};
use crate::models::{
    Conversion, ConversionId, ConversionStats, ConversionStatus, Download, DownloadId,
    ScanResult, WatchConfig, WatchConfigUpdate,
};
use crate::session::{Session, SessionInner, StateEvent};
use std::sync::{PoisonError, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Whether a fetched download list differs from the cached one in a way
/// worth re-rendering
pub fn downloads_materially_changed(cached: &[Download], fetched: &[Download]) -> bool {
    cached.len() != fetched.len()
        || cached
            .iter()
            .zip(fetched)
            .any(|(old, new)| old.conv_status != new.conv_status)
}

/// Badge text for the converter state, `None` when it is not running
pub fn converter_badge(config: &WatchConfig) -> Option<String> {
    if !config.converter_running {
        return None;
    }
    Some(match config.queue_size {
        0 => "converter ready".to_string(),
        n => format!("converting ({} queued)", n),
    })
}

/// What one poll tick changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollOutcome {
    /// The poll reached the backend
    pub fetched: bool,
    pub downloads_changed: bool,
    pub log_changed: bool,
}

/// Background task polling downloads while the downloads view is active
pub(crate) struct DownloadPoller {
    stop_token: CancellationToken,
    handle: JoinHandle<()>,
}

impl DownloadPoller {
    fn spawn(session: Weak<SessionInner>, interval: Duration) -> Self {
        let stop_token = CancellationToken::new();
        let token = stop_token.clone();

        let handle = tokio::spawn(async move {
            tracing::debug!("Downloads poller started ({:?})", interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {},
                }

                let Some(inner) = session.upgrade() else {
                    break;
                };
                let session = Session::from_inner(inner);
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = session.poll_downloads() => {},
                }
            }
            tracing::debug!("Downloads poller stopped");
        });

        Self { stop_token, handle }
    }

    fn is_running(&self) -> bool {
        !self.stop_token.is_cancelled() && !self.handle.is_finished()
    }
}

impl Drop for DownloadPoller {
    fn drop(&mut self) {
        self.stop_token.cancel();
        self.handle.abort();
    }
}

impl Session {
    // ========================================================================
    // Snapshots
    // ========================================================================

    pub fn downloads(&self) -> Vec<Download> {
        self.state().cache.downloads().to_vec()
    }

    pub fn download(&self, id: DownloadId) -> Option<Download> {
        self.state().cache.download(id).cloned()
    }

    pub fn watch_config(&self) -> Option<WatchConfig> {
        self.state().cache.watch_config().cloned()
    }

    /// Badge text for the converter ("converter ready", "converting (N queued)")
    pub fn converter_badge(&self) -> Option<String> {
        self.state().cache.watch_config().and_then(converter_badge)
    }

    // ========================================================================
    // Poller lifecycle
    // ========================================================================

    /// Start polling downloads on the configured interval
    ///
    /// Does nothing if a poller is already running. Must be called from
    /// within a tokio runtime.
    pub fn start_poller(&self) {
        let mut slot = self
            .inner
            .poller
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(DownloadPoller::is_running) {
            return;
        }
        *slot = Some(DownloadPoller::spawn(
            self.downgrade(),
            self.settings().poll_interval,
        ));
    }

    /// Stop the downloads poller, if any
    pub fn stop_poller(&self) {
        let poller = self
            .inner
            .poller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if poller.is_some() {
            tracing::debug!("Stopping downloads poller");
        }
    }

    pub fn poller_running(&self) -> bool {
        self.inner
            .poller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(DownloadPoller::is_running)
    }

    // ========================================================================
    // Loading and polling
    // ========================================================================

    /// Fetch watch config and downloads together and replace both
    pub async fn load_downloads(&self) -> Result<()> {
        let ticket = self.state().cache.begin_downloads_fetch();
        let backend = self.backend();
        let (config, downloads) =
            tokio::join!(backend.get_watch_config(), backend.list_downloads());
        let (config, downloads) = (config?, downloads?);

        let count = downloads.len();
        let applied = {
            let mut state = self.state();
            state.cache.set_watch_config(config);
            state.cache.apply_downloads(ticket, downloads)
        };
        tracing::debug!("Loaded {} downloads", count);

        self.emit(StateEvent::WatchConfigChanged);
        if applied {
            self.emit(StateEvent::DownloadsChanged);
        }
        Ok(())
    }

    /// One poll tick
    ///
    /// The watch config (converter badge) is refreshed every time; the
    /// download list only on a material change. Failures are swallowed,
    /// the next tick simply tries again.
    pub async fn poll_downloads(&self) -> PollOutcome {
        let ticket = self.state().cache.begin_downloads_fetch();
        let backend = self.backend();
        let (config, downloads) =
            tokio::join!(backend.get_watch_config(), backend.list_downloads());

        let (config, downloads) = match (config, downloads) {
            (Ok(config), Ok(downloads)) => (config, downloads),
            (Err(e), _) | (_, Err(e)) => {
                tracing::debug!("Downloads poll failed: {}", e);
                return PollOutcome::default();
            }
        };

        let downloads_changed = {
            let mut state = self.state();
            state.cache.set_watch_config(config);
            if state.cache.downloads_fetch_is_current(ticket)
                && downloads_materially_changed(state.cache.downloads(), &downloads)
            {
                state.cache.apply_downloads(ticket, downloads)
            } else {
                false
            }
        };

        self.emit(StateEvent::WatchConfigChanged);
        if downloads_changed {
            tracing::debug!("Downloads changed since last poll");
            self.emit(StateEvent::DownloadsChanged);
        }

        let log_changed = self.refresh_backend_log().await;
        PollOutcome {
            fetched: true,
            downloads_changed,
            log_changed,
        }
    }

    /// Pull the backend log tail into the activity log
    ///
    /// Returns whether the activity log was replaced. Errors are ignored.
    pub async fn refresh_backend_log(&self) -> bool {
        let n = self.settings().recent_log_lines;
        let lines = match self.backend().recent_logs(n).await {
            Ok(lines) => lines,
            Err(e) => {
                tracing::debug!("Failed to fetch backend log: {}", e);
                return false;
            }
        };
        let replaced = self.state().activity.replace_from_backend(lines);
        if replaced {
            self.emit(StateEvent::ActivityChanged);
        }
        replaced
    }

    // ========================================================================
    // Conversions
    // ========================================================================

    /// Mark a download as queued after its enqueue succeeded
    fn mark_pending(&self, id: DownloadId, conversion: ConversionId) -> bool {
        let mut state = self.state();
        let Some(download) = state.cache.download_mut(id) else {
            return false;
        };
        if !download.conv_status.can_transition_to(ConversionStatus::Pending) {
            tracing::debug!(
                "Download {} is {}, not marking it pending",
                id,
                download.conv_status
            );
            return false;
        }
        download.conv_status = ConversionStatus::Pending;
        download.conv_id = Some(conversion);
        download.conv_error = None;
        true
    }

    /// Queue one download for conversion
    pub async fn convert_single(&self, id: DownloadId) -> Result<ConversionId> {
        if self.state().cache.download(id).is_none() {
            return Err(Error::DownloadNotFound(id));
        }
        let conversion = self
            .backend()
            .convert_download(id)
            .await
            .map_err(|e| self.report(e))?;

        tracing::info!("Download {} queued as conversion {}", id, conversion);
        if self.mark_pending(id, conversion) {
            self.emit(StateEvent::DownloadsChanged);
        }
        Ok(conversion)
    }

    /// Queue every download that was never converted or whose conversion
    /// failed, returning how many were queued
    ///
    /// Rejected downloads are logged and skipped; a transport failure stops
    /// the batch.
    ///
    /// ```no_run
    /// use ordclient::Session;
    /// use ordconfig::get_config;
    ///
    /// # tokio_test::block_on(async {
    /// let session = Session::from_config(&get_config()).unwrap();
    /// session.load_downloads().await.unwrap();
    ///
    /// let queued = session.convert_all().await.unwrap();
    /// println!("{} files queued", queued);
    /// # });
    /// ```
    pub async fn convert_all(&self) -> Result<usize> {
        let targets: Vec<DownloadId> = self
            .state()
            .cache
            .downloads()
            .iter()
            .filter(|d| d.conv_status.needs_conversion())
            .map(|d| d.id)
            .collect();

        if targets.is_empty() {
            self.log_activity("Nothing to convert");
            return Ok(0);
        }
        self.log_activity(format!(
            "Queuing {} files for conversion...",
            targets.len()
        ));

        let mut queued = 0;
        let mut outcome = Ok(());
        for id in &targets {
            match self.backend().convert_download(*id).await {
                Ok(conversion) => {
                    self.mark_pending(*id, conversion);
                    queued += 1;
                }
                Err(e) if e.is_backend() => {
                    self.report(e);
                }
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }
        }
        self.emit(StateEvent::DownloadsChanged);
        outcome?;

        if queued == targets.len() {
            self.log_activity("All files queued for conversion");
        } else {
            self.log_activity(format!(
                "Queued {} of {} files for conversion",
                queued,
                targets.len()
            ));
        }
        Ok(queued)
    }

    /// Retry a failed conversion, then reload everything
    ///
    /// The new state is taken from the backend rather than guessed locally.
    pub async fn retry_conversion(&self, id: ConversionId) -> Result<()> {
        self.backend()
            .retry_conversion(id)
            .await
            .map_err(|e| self.report(e))?;
        tracing::info!("Conversion {} retried", id);
        self.load_downloads().await
    }

    pub async fn list_conversions(&self) -> Result<Vec<Conversion>> {
        self.backend().list_conversions().await
    }

    pub async fn conversion_stats(&self) -> Result<ConversionStats> {
        self.backend().conversion_stats().await
    }

    // ========================================================================
    // Watch folder
    // ========================================================================

    /// Save source/output folders
    ///
    /// The reply replaces the cached config except for `queue_size`, which
    /// it does not carry.
    pub async fn save_watch_config(&self, update: WatchConfigUpdate) -> Result<WatchConfig> {
        let saved = self
            .backend()
            .set_watch_config(&update)
            .await
            .map_err(|e| self.report(e))?;

        let config = {
            let mut state = self.state();
            state.cache.set_watch_config_after_save(saved);
            state.cache.watch_config().cloned().unwrap_or_default()
        };
        tracing::info!(
            "Watch config saved: watch={} output={}",
            config.path,
            config.output_folder
        );
        self.log_activity("Config saved");
        self.emit(StateEvent::WatchConfigChanged);
        Ok(config)
    }

    /// Save the config, scan the watch folder, then reload downloads
    ///
    /// A rejected save is logged and the scan still runs.
    pub async fn scan_folder(&self, update: WatchConfigUpdate) -> Result<ScanResult> {
        self.log_activity("Saving config and starting scan...");
        if let Err(e) = self.save_watch_config(update).await {
            if e.is_transport() {
                return Err(e);
            }
        }

        let result = match self.backend().scan_folder().await {
            Ok(result) => result,
            Err(e) => {
                let e = self.report(e);
                if let Err(reload) = self.load_downloads().await {
                    tracing::debug!("Reload after failed scan failed: {}", reload);
                }
                return Err(e);
            }
        };

        self.log_activity(format!(
            "Scan complete: {} files found, {} new",
            result.scanned, result.added
        ));
        self.load_downloads().await?;
        self.refresh_backend_log().await;
        Ok(result)
    }

    /// Ask the backend to show a folder picker; `None` when cancelled
    pub async fn browse_folder(&self) -> Result<Option<String>> {
        self.backend().browse_folder().await
    }

    /// Remove a download (and its conversion job) on the backend and locally
    pub async fn delete_download(&self, id: DownloadId) -> Result<()> {
        self.backend()
            .delete_download(id)
            .await
            .map_err(|e| self.report(e))?;
        if self.state().cache.remove_download(id).is_some() {
            self.emit(StateEvent::DownloadsChanged);
        }
        Ok(())
    }
}
