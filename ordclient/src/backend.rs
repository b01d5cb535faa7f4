//! Backend abstraction
//!
//! The session never talks to a transport directly: everything goes through
//! the [`Backend`] trait. [`crate::HttpBackend`] implements it over the JSON
//! API; tests use an in-memory implementation.

use crate::error::{Error, Result};
use crate::models::{
    AudioFormat, Conversion, ConversionId, ConversionStats, Download, DownloadId,
    ExportedTracks, ImportedPlaylist, Playlist, PlaylistId, ScanResult, SongId, SongPlaylist,
    Track, WatchConfig, WatchConfigUpdate,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

/// Songs targeted by a bulk format update
///
/// The backend accepts either an explicit id list or a playlist id, never
/// both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkTarget {
    Songs(Vec<SongId>),
    Playlist(PlaylistId),
}

impl BulkTarget {
    /// An empty id list would make the backend fall back to a wider update
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Songs(ids) if ids.is_empty())
    }
}

/// Wire body of a bulk format update
#[derive(Debug, Serialize)]
pub(crate) struct BulkFormatRequest<'a> {
    pub format: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ids: Option<&'a [SongId]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playlist_id: Option<PlaylistId>,
}

impl<'a> BulkFormatRequest<'a> {
    pub fn new(format: &'a AudioFormat, target: &'a BulkTarget) -> Self {
        match target {
            BulkTarget::Songs(ids) => Self {
                format: format.as_str(),
                ids: Some(ids),
                playlist_id: None,
            },
            BulkTarget::Playlist(id) => Self {
                format: format.as_str(),
                ids: None,
                playlist_id: Some(*id),
            },
        }
    }
}

/// Decode a backend reply
///
/// A JSON object carrying a non-null `error` field is a business error;
/// anything else is the success payload.
pub fn decode_reply<T: DeserializeOwned>(value: serde_json::Value) -> Result<T> {
    if let Some(err) = value.get("error").filter(|e| !e.is_null()) {
        let msg = match err.as_str() {
            Some(s) => s.to_string(),
            None => err.to_string(),
        };
        return Err(Error::Backend(msg));
    }
    Ok(serde_json::from_value(value)?)
}

/// Request/response operations offered by the Ordnung backend
#[async_trait]
pub trait Backend: Debug + Send + Sync {
    // Playlists
    async fn list_playlists(&self) -> Result<Vec<Playlist>>;
    async fn import_playlist(
        &self,
        file_name: &str,
        contents: Vec<u8>,
        name: Option<&str>,
    ) -> Result<ImportedPlaylist>;
    async fn delete_playlist(&self, id: PlaylistId) -> Result<()>;
    async fn get_tracks(&self, playlist_id: PlaylistId) -> Result<Vec<Track>>;
    async fn export_tracks(
        &self,
        playlist_id: PlaylistId,
        format: Option<&AudioFormat>,
    ) -> Result<ExportedTracks>;

    // Songs
    async fn update_track_format(&self, song_id: SongId, format: &AudioFormat) -> Result<()>;
    async fn update_track_aiff(&self, song_id: SongId, has_aiff: bool) -> Result<()>;
    async fn bulk_update_format(&self, format: &AudioFormat, target: &BulkTarget) -> Result<()>;
    async fn get_song_playlists(&self, song_id: SongId) -> Result<Vec<SongPlaylist>>;
    async fn update_song_playlists(
        &self,
        song_id: SongId,
        add: &[PlaylistId],
        remove: &[PlaylistId],
    ) -> Result<()>;

    // Watch folder
    async fn get_watch_config(&self) -> Result<WatchConfig>;
    async fn set_watch_config(&self, update: &WatchConfigUpdate) -> Result<WatchConfig>;
    async fn scan_folder(&self) -> Result<ScanResult>;
    /// `None` when the picker was cancelled
    async fn browse_folder(&self) -> Result<Option<String>>;

    // Downloads and conversions
    async fn list_downloads(&self) -> Result<Vec<Download>>;
    async fn delete_download(&self, id: DownloadId) -> Result<()>;
    async fn list_conversions(&self) -> Result<Vec<Conversion>>;
    async fn conversion_stats(&self) -> Result<ConversionStats>;
    async fn retry_conversion(&self, id: ConversionId) -> Result<()>;
    async fn convert_download(&self, id: DownloadId) -> Result<ConversionId>;

    // Logs
    async fn recent_logs(&self, n: usize) -> Result<Vec<String>>;
}
