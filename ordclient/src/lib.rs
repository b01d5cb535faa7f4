//! Client library for the Ordnung music library and conversion backend
//!
//! This crate is the state engine a front end sits on: it keeps working
//! copies of playlists, tracks and downloads, applies user edits, keeps a
//! one-step undo for bulk format changes, polls conversion jobs and derives
//! filtered views. It renders nothing; front ends subscribe to
//! [`StateEvent`]s and read snapshots from the [`Session`].
//!
//! # Features
//!
//! - **Library**: playlists, track search and genre facets, format tallies,
//!   per-song playlist membership, import and export
//! - **Format edits**: single and bulk format changes, AIFF flag, undo of
//!   the last bulk change
//! - **Downloads**: watch-folder config, folder scans, conversion queueing,
//!   retry, and a background poller that only signals material changes
//! - **Activity log**: bounded, timestamped, merged with the backend log tail
//! - **Configuration extension**: client tunables stored through `ordconfig`
//!
//! # Example
//!
//! ```no_run
//! use ordclient::{AudioFormat, Session};
//! use ordconfig::get_config;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = Session::from_config(&get_config())?;
//!
//!     session.load_playlists().await?;
//!     let Some(playlist) = session.playlists().first().cloned() else {
//!         return Ok(());
//!     };
//!     session.select_playlist(playlist.id).await?;
//!
//!     // Everything currently visible becomes FLAC, then change our mind
//!     session.set_search("house");
//!     session.bulk_set_visible_format(AudioFormat::Flac).await?;
//!     session.undo_bulk_format().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Backends
//!
//! All I/O goes through the [`Backend`] trait. [`HttpBackend`] talks to the
//! JSON API; any other transport is another implementation of the trait.

pub mod activity;
pub mod backend;
pub mod cache;
pub mod client;
pub mod config_ext;
pub mod error;
pub mod filter;
pub mod logging;
pub mod models;
mod mutations;
pub mod reconciler;
pub mod session;
pub mod undo;

pub use activity::{ActivityEntry, ActivityLevel, ActivityLog, ActivitySource};
pub use backend::{decode_reply, Backend, BulkTarget};
pub use client::{ClientBuilder, HttpBackend};
pub use config_ext::ClientConfigExt;
pub use error::{Error, Result};
pub use logging::{init_logging, LogControl};
pub use models::{
    export_file_name, AudioFormat, Conversion, ConversionId, ConversionStats, ConversionStatus,
    Download, DownloadId, ExportedTracks, FormatClass, ImportedPlaylist, Playlist, PlaylistId,
    ScanResult, SongId, SongPlaylist, Track, WatchConfig, WatchConfigUpdate, AUDIO_FORMATS,
};
pub use reconciler::{converter_badge, downloads_materially_changed, PollOutcome};
pub use session::{
    FormatStats, ImportReport, Session, SessionSettings, StateEvent, View, ViewState,
};
pub use undo::{UndoBuffer, UndoEntry, UndoSnapshot};
