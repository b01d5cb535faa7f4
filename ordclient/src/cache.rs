//! Working copies of backend entities
//!
//! The cache never fetches anything itself. Owners of an operation decide
//! when a collection is stale and replace it explicitly.

use crate::models::{
    AudioFormat, Download, DownloadId, Playlist, PlaylistId, SongId, SongPlaylist, Track,
    WatchConfig,
};
use std::collections::HashMap;

/// Ticket identifying one fetch; a reply is applied only while its ticket
/// is still current
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FetchTicket(u64);

#[derive(Debug, Default)]
pub struct EntityCache {
    playlists: Vec<Playlist>,
    active_playlist: Option<PlaylistId>,
    tracks: Vec<Track>,
    selection: u64,
    downloads: Vec<Download>,
    downloads_issued: u64,
    downloads_applied: u64,
    watch_config: Option<WatchConfig>,
    song_playlists: HashMap<SongId, Vec<SongPlaylist>>,
}

impl EntityCache {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Playlists
    // ========================================================================

    pub fn playlists(&self) -> &[Playlist] {
        &self.playlists
    }

    pub fn set_playlists(&mut self, playlists: Vec<Playlist>) {
        self.playlists = playlists;
    }

    pub fn playlist(&self, id: PlaylistId) -> Option<&Playlist> {
        self.playlists.iter().find(|p| p.id == id)
    }

    pub fn active_playlist(&self) -> Option<PlaylistId> {
        self.active_playlist
    }

    // ========================================================================
    // Tracks (scoped to the active playlist)
    // ========================================================================

    /// Switch the active playlist and drop the previous track collection
    ///
    /// Replies to earlier selections are rejected from now on.
    pub fn begin_selection(&mut self, playlist: Option<PlaylistId>) -> FetchTicket {
        self.selection += 1;
        self.active_playlist = playlist;
        self.tracks.clear();
        FetchTicket(self.selection)
    }

    /// Ticket for refetching the current selection without switching
    pub fn current_selection(&self) -> FetchTicket {
        FetchTicket(self.selection)
    }

    /// Install the tracks of the selection identified by `ticket`
    ///
    /// Returns `false` and drops `tracks` if the selection was superseded.
    pub fn apply_tracks(&mut self, ticket: FetchTicket, tracks: Vec<Track>) -> bool {
        if ticket.0 != self.selection {
            tracing::debug!(
                "Dropping stale track list (selection {} superseded by {})",
                ticket.0,
                self.selection
            );
            return false;
        }
        self.tracks = tracks;
        true
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track(&self, song_id: SongId) -> Option<&Track> {
        self.tracks.iter().find(|t| t.song_id == song_id)
    }

    pub fn set_track_format(&mut self, song_id: SongId, format: &AudioFormat) -> bool {
        match self.tracks.iter_mut().find(|t| t.song_id == song_id) {
            Some(track) => {
                track.format = format.clone();
                true
            }
            None => false,
        }
    }

    pub fn set_track_aiff(&mut self, song_id: SongId, has_aiff: bool) -> bool {
        match self.tracks.iter_mut().find(|t| t.song_id == song_id) {
            Some(track) => {
                track.has_aiff = has_aiff;
                true
            }
            None => false,
        }
    }

    /// Set `format` on every cached track whose id is in `ids`
    pub fn set_formats(&mut self, ids: &[SongId], format: &AudioFormat) -> usize {
        let mut updated = 0;
        for track in self.tracks.iter_mut().filter(|t| ids.contains(&t.song_id)) {
            track.format = format.clone();
            updated += 1;
        }
        updated
    }

    /// Set every cached track to `format`
    pub fn set_all_formats(&mut self, format: &AudioFormat) -> usize {
        for track in &mut self.tracks {
            track.format = format.clone();
        }
        self.tracks.len()
    }

    /// Restore formats from a song-id lookup; ids not in the lookup are kept
    pub fn restore_formats(&mut self, lookup: &HashMap<SongId, AudioFormat>) -> usize {
        let mut restored = 0;
        for track in &mut self.tracks {
            if let Some(prior) = lookup.get(&track.song_id) {
                track.format = prior.clone();
                restored += 1;
            }
        }
        restored
    }

    /// Forget the selection entirely (e.g. the active playlist was deleted)
    pub fn clear_selection(&mut self) {
        self.begin_selection(None);
    }

    // ========================================================================
    // Song membership
    // ========================================================================

    pub fn song_playlists(&self, song_id: SongId) -> Option<&[SongPlaylist]> {
        self.song_playlists.get(&song_id).map(Vec::as_slice)
    }

    pub fn set_song_playlists(&mut self, song_id: SongId, playlists: Vec<SongPlaylist>) {
        self.song_playlists.insert(song_id, playlists);
    }

    /// Flip the cached `member` flag of one entry
    pub fn set_membership(&mut self, song_id: SongId, playlist: PlaylistId, member: bool) -> bool {
        match self
            .song_playlists
            .get_mut(&song_id)
            .and_then(|list| list.iter_mut().find(|p| p.id == playlist))
        {
            Some(entry) => {
                entry.member = member;
                true
            }
            None => false,
        }
    }

    pub fn invalidate_song_playlists(&mut self, song_id: SongId) {
        self.song_playlists.remove(&song_id);
    }

    /// Drop every membership list (the set of playlists changed)
    pub fn clear_song_playlists(&mut self) {
        self.song_playlists.clear();
    }

    // ========================================================================
    // Downloads
    // ========================================================================

    /// Ticket for a downloads fetch about to be sent
    pub fn begin_downloads_fetch(&mut self) -> FetchTicket {
        self.downloads_issued += 1;
        FetchTicket(self.downloads_issued)
    }

    /// Whether a reply for `ticket` is newer than what is installed
    pub fn downloads_fetch_is_current(&self, ticket: FetchTicket) -> bool {
        ticket.0 > self.downloads_applied
    }

    /// Install a downloads reply; older replies than the installed one lose
    pub fn apply_downloads(&mut self, ticket: FetchTicket, downloads: Vec<Download>) -> bool {
        if !self.downloads_fetch_is_current(ticket) {
            tracing::debug!("Dropping out-of-order downloads reply #{}", ticket.0);
            return false;
        }
        self.downloads_applied = ticket.0;
        self.downloads = downloads;
        true
    }

    pub fn downloads(&self) -> &[Download] {
        &self.downloads
    }

    pub fn download(&self, id: DownloadId) -> Option<&Download> {
        self.downloads.iter().find(|d| d.id == id)
    }

    pub fn download_mut(&mut self, id: DownloadId) -> Option<&mut Download> {
        self.downloads.iter_mut().find(|d| d.id == id)
    }

    pub fn remove_download(&mut self, id: DownloadId) -> Option<Download> {
        let pos = self.downloads.iter().position(|d| d.id == id)?;
        Some(self.downloads.remove(pos))
    }

    // ========================================================================
    // Watch config
    // ========================================================================

    pub fn watch_config(&self) -> Option<&WatchConfig> {
        self.watch_config.as_ref()
    }

    /// Replace the watch config wholesale
    pub fn set_watch_config(&mut self, config: WatchConfig) {
        self.watch_config = Some(config);
    }

    /// Replace the watch config with a save reply, keeping the local
    /// `queue_size` which the reply does not carry
    pub fn set_watch_config_after_save(&mut self, mut config: WatchConfig) {
        config.queue_size = self
            .watch_config
            .as_ref()
            .map(|c| c.queue_size)
            .unwrap_or_default();
        self.watch_config = Some(config);
    }
}
