//! Client session: the application state object behind any front end
//!
//! A [`Session`] owns the entity cache, the view state, the undo buffer and
//! the activity log, and is the only thing allowed to mutate them. Front ends
//! read snapshots through its accessors and learn about changes by
//! subscribing to [`StateEvent`]s.
//!
//! # Example
//!
//! ```no_run
//! use ordclient::{Session, StateEvent};
//! use ordconfig::get_config;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = Session::from_config(&get_config())?;
//!     let mut events = session.subscribe();
//!
//!     session.load_playlists().await?;
//!     if let Some(first) = session.playlists().first() {
//!         session.select_playlist(first.id).await?;
//!     }
//!
//!     while let Ok(event) = events.recv().await {
//!         if event == StateEvent::TracksChanged {
//!             println!("{} visible tracks", session.visible_tracks().len());
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Locking
//!
//! State lives behind one `std::sync::Mutex`. The lock is only taken for
//! short synchronous sections and is never held across an `.await`.

use crate::activity::{ActivityEntry, ActivityLog};
use crate::backend::Backend;
use crate::cache::EntityCache;
use crate::client::HttpBackend;
use crate::config_ext::{
    ClientConfigExt, DEFAULT_ACTIVITY_CAPACITY, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_RECENT_LOG_LINES, DEFAULT_TOP_GENRES,
};
use crate::error::{Error, Result};
use crate::filter;
use crate::models::{
    AudioFormat, ExportedTracks, FormatClass, ImportedPlaylist, Playlist, PlaylistId, SongId,
    SongPlaylist, Track,
};
use crate::reconciler::DownloadPoller;
use crate::undo::UndoBuffer;
use ordconfig::Config;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::broadcast;

/// Capacity of the event channel; slow subscribers see `Lagged`
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Top-level screen the user is looking at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum View {
    #[default]
    Library,
    Downloads,
}

/// Notification that part of the state changed and dependent views
/// should recompute
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateEvent {
    PlaylistsChanged,
    TracksChanged,
    DownloadsChanged,
    WatchConfigChanged,
    UndoChanged,
    ActivityChanged,
    SongPlaylistsChanged(SongId),
    ViewChanged(View),
}

/// Tunables read once when the session is built
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub poll_interval: Duration,
    pub recent_log_lines: usize,
    pub activity_capacity: usize,
    pub top_genres: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            recent_log_lines: DEFAULT_RECENT_LOG_LINES as usize,
            activity_capacity: DEFAULT_ACTIVITY_CAPACITY as usize,
            top_genres: DEFAULT_TOP_GENRES as usize,
        }
    }
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            poll_interval: config.downloads_poll_interval()?,
            recent_log_lines: config.recent_log_lines()?,
            activity_capacity: config.activity_capacity()?,
            top_genres: config.top_genres_count()?,
        })
    }
}

/// Search and facet state of the library view
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewState {
    pub view: View,
    pub search: String,
    pub genre_filter: Option<String>,
    pub expanded_song: Option<SongId>,
}

impl ViewState {
    fn reset_library(&mut self) {
        self.search.clear();
        self.genre_filter = None;
        self.expanded_song = None;
    }
}

/// Everything guarded by the session lock
#[derive(Debug)]
pub(crate) struct SessionState {
    pub cache: EntityCache,
    pub view: ViewState,
    pub undo: UndoBuffer,
    pub activity: ActivityLog,
}

/// Track count and per-format tally of the active playlist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatStats {
    pub total: usize,
    pub counts: Vec<(FormatClass, usize)>,
}

/// Outcome of importing several playlist exports
#[derive(Debug, Default)]
pub struct ImportReport {
    pub imported: Vec<ImportedPlaylist>,
    pub skipped: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, Error)>,
}

pub(crate) struct SessionInner {
    pub backend: Arc<dyn Backend>,
    pub state: Mutex<SessionState>,
    pub events: broadcast::Sender<StateEvent>,
    pub settings: SessionSettings,
    pub poller: Mutex<Option<DownloadPoller>>,
}

/// Shared handle on the client state; cheap to clone
#[derive(Clone)]
pub struct Session {
    pub(crate) inner: Arc<SessionInner>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("backend", &self.inner.backend)
            .field("settings", &self.inner.settings)
            .finish()
    }
}

impl Session {
    /// Create a session with default settings
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self::with_settings(backend, SessionSettings::default())
    }

    pub fn with_settings(backend: Arc<dyn Backend>, settings: SessionSettings) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let state = SessionState {
            cache: EntityCache::new(),
            view: ViewState::default(),
            undo: UndoBuffer::new(),
            activity: ActivityLog::new(settings.activity_capacity),
        };
        Self {
            inner: Arc::new(SessionInner {
                backend,
                state: Mutex::new(state),
                events,
                settings,
                poller: Mutex::new(None),
            }),
        }
    }

    /// HTTP backend and settings taken from the configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let backend = HttpBackend::from_config(config)?;
        let settings = SessionSettings::from_config(config)?;
        Ok(Self::with_settings(Arc::new(backend), settings))
    }

    pub(crate) fn downgrade(&self) -> Weak<SessionInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn from_inner(inner: Arc<SessionInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn backend(&self) -> &dyn Backend {
        self.inner.backend.as_ref()
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.inner.settings
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, SessionState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // ========================================================================
    // Events and activity
    // ========================================================================

    /// Subscribe to state change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<StateEvent> {
        self.inner.events.subscribe()
    }

    pub(crate) fn emit(&self, event: StateEvent) {
        // no subscribers is fine
        let _ = self.inner.events.send(event);
    }

    /// Append a locally generated line to the activity log
    pub fn log_activity(&self, message: impl Into<String>) {
        self.state().activity.push_local(message);
        self.emit(StateEvent::ActivityChanged);
    }

    /// Log a business error, returning it unchanged for propagation
    ///
    /// Transport errors are returned untouched.
    pub(crate) fn report(&self, err: Error) -> Error {
        if err.is_backend() {
            tracing::warn!("Backend rejected request: {}", err);
            self.state().activity.push_error(&err);
            self.emit(StateEvent::ActivityChanged);
        }
        err
    }

    pub fn activity(&self) -> Vec<ActivityEntry> {
        self.state().activity.snapshot()
    }

    // ========================================================================
    // Views
    // ========================================================================

    pub fn view(&self) -> View {
        self.state().view.view
    }

    pub fn view_state(&self) -> ViewState {
        self.state().view.clone()
    }

    /// Switch the active view
    ///
    /// Entering the library reloads playlists. Entering downloads reloads
    /// the watch config and downloads and starts the poller, which is
    /// stopped again when the downloads view is left. The poller runs even
    /// when the initial load fails; that error is still returned.
    pub async fn set_view(&self, view: View) -> Result<()> {
        let previous = {
            let mut state = self.state();
            std::mem::replace(&mut state.view.view, view)
        };
        if previous != view {
            tracing::debug!("View changed: {:?} -> {:?}", previous, view);
            self.emit(StateEvent::ViewChanged(view));
        }

        match view {
            View::Library => {
                self.stop_poller();
                self.load_playlists().await
            }
            View::Downloads => {
                // the poller also recovers from a failed first load
                self.start_poller();
                self.load_downloads().await?;
                self.refresh_backend_log().await;
                Ok(())
            }
        }
    }

    // ========================================================================
    // Playlists
    // ========================================================================

    pub fn playlists(&self) -> Vec<Playlist> {
        self.state().cache.playlists().to_vec()
    }

    pub fn active_playlist(&self) -> Option<PlaylistId> {
        self.state().cache.active_playlist()
    }

    /// Refetch the playlist list (totals and format tallies)
    pub async fn load_playlists(&self) -> Result<()> {
        let playlists = self.backend().list_playlists().await?;
        tracing::debug!("Loaded {} playlists", playlists.len());
        self.state().cache.set_playlists(playlists);
        self.emit(StateEvent::PlaylistsChanged);
        Ok(())
    }

    /// Make `id` the active playlist and load its tracks
    ///
    /// Search, genre facet and expanded song are reset. A reply arriving
    /// after another playlist was selected is dropped.
    pub async fn select_playlist(&self, id: PlaylistId) -> Result<()> {
        let ticket = {
            let mut state = self.state();
            state.view.reset_library();
            state.cache.begin_selection(Some(id))
        };
        self.emit(StateEvent::TracksChanged);

        let tracks = self.backend().get_tracks(id).await?;
        let count = tracks.len();
        if self.state().cache.apply_tracks(ticket, tracks) {
            tracing::debug!("Playlist {} selected: {} tracks", id, count);
            self.emit(StateEvent::TracksChanged);
        }
        Ok(())
    }

    /// Refetch the tracks of the active playlist, keeping filters
    pub async fn reload_tracks(&self) -> Result<()> {
        let (id, ticket) = {
            let state = self.state();
            (state.cache.active_playlist(), state.cache.current_selection())
        };
        let Some(id) = id else {
            return Ok(());
        };
        let tracks = self.backend().get_tracks(id).await?;
        if self.state().cache.apply_tracks(ticket, tracks) {
            self.emit(StateEvent::TracksChanged);
        }
        Ok(())
    }

    /// Import playlist exports
    ///
    /// Only `.txt` files are sent. A failing file does not stop the others.
    /// Afterwards playlists are reloaded and the last imported one selected.
    pub async fn import_files<P: AsRef<Path>>(&self, paths: &[P]) -> Result<ImportReport> {
        let mut report = ImportReport::default();

        for path in paths.iter().map(AsRef::as_ref) {
            let is_txt = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("txt"));
            if !is_txt {
                tracing::debug!("Skipping non-txt import {}", path.display());
                report.skipped.push(path.to_path_buf());
                continue;
            }

            match self.import_file(path).await {
                Ok(imported) => {
                    tracing::info!(
                        "Imported playlist '{}' ({} tracks)",
                        imported.name,
                        imported.track_count
                    );
                    report.imported.push(imported);
                }
                Err(err) => {
                    let err = self.report(err);
                    tracing::warn!("Import of {} failed: {}", path.display(), err);
                    report.failed.push((path.to_path_buf(), err));
                }
            }
        }

        if report.imported.is_empty() && report.failed.is_empty() {
            return Ok(report);
        }

        self.state().cache.clear_song_playlists();
        self.load_playlists().await?;
        if let Some(last) = report.imported.last() {
            self.select_playlist(last.id).await?;
        }
        Ok(report)
    }

    async fn import_file(&self, path: &Path) -> Result<ImportedPlaylist> {
        let contents = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "playlist.txt".to_string());
        self.backend()
            .import_playlist(&file_name, contents, None)
            .await
    }

    /// Delete a playlist; if it was active the selection is cleared
    pub async fn delete_playlist(&self, id: PlaylistId) -> Result<()> {
        self.backend()
            .delete_playlist(id)
            .await
            .map_err(|e| self.report(e))?;
        tracing::info!("Deleted playlist {}", id);

        let was_active = {
            let mut state = self.state();
            state.cache.clear_song_playlists();
            if state.cache.active_playlist() == Some(id) {
                state.cache.clear_selection();
                state.view.reset_library();
                true
            } else {
                false
            }
        };
        if was_active {
            self.emit(StateEvent::TracksChanged);
        }
        self.load_playlists().await
    }

    /// Export listing of the active playlist, optionally restricted to one
    /// format
    pub async fn export_tracks(&self, format: Option<&AudioFormat>) -> Result<ExportedTracks> {
        let id = self.active_playlist().ok_or(Error::NoActivePlaylist)?;
        self.backend()
            .export_tracks(id, format)
            .await
            .map_err(|e| self.report(e))
    }

    /// Distinct formats present in the active playlist, sorted by name
    pub fn export_formats(&self) -> Vec<AudioFormat> {
        let mut formats: Vec<AudioFormat> = Vec::new();
        for track in self.state().cache.tracks() {
            if !formats.contains(&track.format) {
                formats.push(track.format.clone());
            }
        }
        formats.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        formats
    }

    // ========================================================================
    // Tracks and derived views
    // ========================================================================

    pub fn tracks(&self) -> Vec<Track> {
        self.state().cache.tracks().to_vec()
    }

    pub fn track(&self, song_id: SongId) -> Option<Track> {
        self.state().cache.track(song_id).cloned()
    }

    /// Tracks of the active playlist passing the search text and genre facet
    pub fn visible_tracks(&self) -> Vec<Track> {
        let state = self.state();
        let genre = state.view.genre_filter.as_deref().unwrap_or("");
        filter::filter_tracks(state.cache.tracks(), &state.view.search, genre)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Most frequent genres of the active playlist
    pub fn top_genres(&self) -> Vec<String> {
        filter::top_genres(self.state().cache.tracks(), self.inner.settings.top_genres)
    }

    pub fn format_stats(&self) -> FormatStats {
        let state = self.state();
        let tracks = state.cache.tracks();
        FormatStats {
            total: tracks.len(),
            counts: filter::format_counts(tracks),
        }
    }

    pub fn set_search(&self, text: impl Into<String>) {
        self.state().view.search = text.into();
        self.emit(StateEvent::TracksChanged);
    }

    pub fn set_genre_filter(&self, genre: Option<String>) {
        self.state().view.genre_filter = genre.map(|g| g.trim().to_lowercase());
        self.emit(StateEvent::TracksChanged);
    }

    /// Select a genre facet, or clear it if it is already selected
    pub fn toggle_genre(&self, genre: &str) {
        let genre = genre.trim().to_lowercase();
        {
            let mut state = self.state();
            if state.view.genre_filter.as_deref() == Some(genre.as_str()) {
                state.view.genre_filter = None;
            } else {
                state.view.genre_filter = Some(genre);
            }
        }
        self.emit(StateEvent::TracksChanged);
    }

    // ========================================================================
    // Song detail and playlist membership
    // ========================================================================

    /// Cached membership list of a song, if it was loaded
    pub fn song_playlists(&self, song_id: SongId) -> Option<Vec<SongPlaylist>> {
        self.state().cache.song_playlists(song_id).map(<[_]>::to_vec)
    }

    /// Expand or collapse a track's detail panel
    ///
    /// Expanding returns the song's membership list, fetching it the first
    /// time. Collapsing returns `None`.
    pub async fn toggle_detail(&self, song_id: SongId) -> Result<Option<Vec<SongPlaylist>>> {
        let cached = {
            let mut state = self.state();
            if state.view.expanded_song == Some(song_id) {
                state.view.expanded_song = None;
                drop(state);
                self.emit(StateEvent::SongPlaylistsChanged(song_id));
                return Ok(None);
            }
            state.view.expanded_song = Some(song_id);
            state.cache.song_playlists(song_id).map(<[_]>::to_vec)
        };
        self.emit(StateEvent::SongPlaylistsChanged(song_id));

        if let Some(list) = cached {
            return Ok(Some(list));
        }

        let list = self.backend().get_song_playlists(song_id).await?;
        self.state()
            .cache
            .set_song_playlists(song_id, list.clone());
        self.emit(StateEvent::SongPlaylistsChanged(song_id));
        Ok(Some(list))
    }

    /// Add a song to, or remove it from, a playlist
    pub async fn toggle_song_playlist(
        &self,
        song_id: SongId,
        playlist: PlaylistId,
        add: bool,
    ) -> Result<()> {
        let ids = [playlist];
        let (add_ids, remove_ids): (&[PlaylistId], &[PlaylistId]) =
            if add { (&ids, &[]) } else { (&[], &ids) };
        self.backend()
            .update_song_playlists(song_id, add_ids, remove_ids)
            .await
            .map_err(|e| self.report(e))?;

        self.state().cache.set_membership(song_id, playlist, add);
        self.emit(StateEvent::SongPlaylistsChanged(song_id));

        if self.active_playlist() == Some(playlist) {
            self.reload_tracks().await?;
        }
        self.load_playlists().await
    }
}
