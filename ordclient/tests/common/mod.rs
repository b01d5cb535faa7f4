//! In-memory backend shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use ordclient::{
    AudioFormat, Backend, BulkTarget, Conversion, ConversionId, ConversionStats,
    ConversionStatus, Download, DownloadId, Error, ExportedTracks, ImportedPlaylist, Playlist,
    PlaylistId, Result, ScanResult, Session, SessionSettings, SongId, SongPlaylist, StateEvent,
    Track, WatchConfig, WatchConfigUpdate,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{broadcast, Notify};

/// Mutable contents of the fake backend
#[derive(Debug, Default)]
pub struct FakeState {
    pub playlists: Vec<(PlaylistId, String)>,
    /// Ordered (playlist, song) membership rows
    pub members: Vec<(PlaylistId, SongId)>,
    pub songs: BTreeMap<SongId, Track>,
    pub downloads: Vec<Download>,
    /// Files the next scan will discover
    pub scan_files: Vec<Download>,
    pub watch: WatchConfig,
    pub logs: Vec<String>,
    pub browse_result: Option<String>,
    pub next_id: i64,

    /// Operation name -> business error message to return
    pub rejections: HashMap<&'static str, String>,
    /// Reject only bulk updates to this format
    pub reject_bulk_format: Option<AudioFormat>,
    /// Every read and write fails at the transport level
    pub offline: bool,

    pub bulk_calls: Vec<(AudioFormat, BulkTarget)>,
    pub format_calls: Vec<(SongId, AudioFormat)>,
    pub convert_calls: Vec<DownloadId>,
    pub list_downloads_calls: usize,
}

#[derive(Debug, Default)]
pub struct FakeBackend {
    state: Mutex<FakeState>,
    track_gates: Mutex<HashMap<PlaylistId, Arc<Notify>>>,
    bulk_gate: Mutex<Option<Arc<Notify>>>,
}

pub fn transport_error() -> Error {
    serde_json::from_str::<u8>("offline").unwrap_err().into()
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                next_id: 100,
                ..FakeState::default()
            }),
            track_gates: Mutex::new(HashMap::new()),
            bulk_gate: Mutex::new(None),
        }
    }

    /// Two playlists sharing one song
    ///
    /// - 1 "Warmup": songs 1 (mp3, "Deep House; Jazz"), 2 (wav, "house"),
    ///   3 (mp3, "Techno/House")
    /// - 2 "Peak": songs 3, 4 (flac, "Techno")
    pub fn with_library() -> Self {
        let fake = Self::new();
        {
            let mut s = fake.state();
            s.playlists = vec![(1, "Warmup".into()), (2, "Peak".into())];
            s.members = vec![(1, 1), (1, 2), (1, 3), (2, 3), (2, 4)];
            for track in [
                Track::new(1, "CAFÉ NIGHT")
                    .with_artist("Nils")
                    .with_genre("Deep House; Jazz"),
                Track::new(2, "Morning")
                    .with_artist("Ana")
                    .with_genre("house")
                    .with_format(AudioFormat::Wav),
                Track::new(3, "Drive")
                    .with_artist("Kit")
                    .with_genre("Techno/House"),
                Track::new(4, "Peak Time")
                    .with_genre("Techno")
                    .with_format(AudioFormat::Flac),
            ] {
                s.songs.insert(track.song_id, track);
            }
        }
        fake
    }

    /// Watch folder configured with three downloads in various states
    pub fn with_downloads() -> Self {
        let fake = Self::new();
        {
            let mut s = fake.state();
            s.watch = WatchConfig {
                path: "/in".into(),
                output_folder: "/out".into(),
                auto_convert: false,
                active: true,
                converter_running: true,
                queue_size: 2,
            };
            let mut failed = Download::new(11, "b.aiff");
            failed.conv_status = ConversionStatus::Failed;
            failed.conv_id = Some(7);
            failed.conv_error = Some("ffmpeg exited with 1".into());
            let mut done = Download::new(12, "c.flac");
            done.conv_status = ConversionStatus::Done;
            done.conv_id = Some(8);
            s.downloads = vec![Download::new(10, "a.wav"), failed, done];
            s.logs = vec![
                "2024-01-01 10:00:00 [INFO] watcher started".into(),
                "2024-01-01 10:00:01 [WARNING] slow disk".into(),
            ];
        }
        fake
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn reject(&self, op: &'static str, message: &str) {
        self.state().rejections.insert(op, message.to_string());
    }

    pub fn accept(&self, op: &'static str) {
        self.state().rejections.remove(op);
    }

    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    /// Hold `get_tracks(playlist)` until the returned handle is notified
    pub fn gate_tracks(&self, playlist: PlaylistId) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.track_gates
            .lock()
            .unwrap()
            .insert(playlist, notify.clone());
        notify
    }

    /// Hold the next bulk update until the returned handle is notified,
    /// then reject it
    pub fn hold_next_bulk_and_reject(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.bulk_gate.lock().unwrap() = Some(notify.clone());
        notify
    }

    pub fn song_format(&self, song_id: SongId) -> AudioFormat {
        self.state().songs[&song_id].format.clone()
    }

    fn check(&self, op: &str) -> Result<()> {
        let s = self.state();
        if s.offline {
            return Err(transport_error());
        }
        match s.rejections.get(op) {
            Some(msg) => Err(Error::Backend(msg.clone())),
            None => Ok(()),
        }
    }
}

impl FakeState {
    fn playlist_songs(&self, playlist: PlaylistId) -> Vec<SongId> {
        self.members
            .iter()
            .filter(|(p, _)| *p == playlist)
            .map(|(_, s)| *s)
            .collect()
    }

    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn list_playlists(&self) -> Result<Vec<Playlist>> {
        self.check("list_playlists")?;
        let s = self.state();
        Ok(s.playlists
            .iter()
            .map(|(id, name)| {
                let mut format_counts = BTreeMap::new();
                let songs = s.playlist_songs(*id);
                for song in &songs {
                    *format_counts
                        .entry(s.songs[song].format.to_string())
                        .or_insert(0) += 1;
                }
                Playlist {
                    id: *id,
                    name: name.clone(),
                    total: songs.len(),
                    format_counts,
                    imported_at: None,
                }
            })
            .collect())
    }

    async fn import_playlist(
        &self,
        file_name: &str,
        contents: Vec<u8>,
        name: Option<&str>,
    ) -> Result<ImportedPlaylist> {
        self.check("import_playlist")?;
        let text = String::from_utf8_lossy(&contents).into_owned();
        let titles: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
        if titles.is_empty() {
            return Err(Error::Backend("No tracks found in file".into()));
        }

        let mut s = self.state();
        let name = name
            .map(str::to_string)
            .unwrap_or_else(|| file_name.trim_end_matches(".txt").to_string());
        let playlist = s.next_id();
        s.playlists.push((playlist, name.clone()));
        for title in &titles {
            let song = s.next_id();
            s.songs.insert(song, Track::new(song, *title));
            s.members.push((playlist, song));
        }
        Ok(ImportedPlaylist {
            id: playlist,
            name,
            track_count: titles.len(),
        })
    }

    async fn delete_playlist(&self, id: PlaylistId) -> Result<()> {
        self.check("delete_playlist")?;
        let mut s = self.state();
        s.playlists.retain(|(p, _)| *p != id);
        s.members.retain(|(p, _)| *p != id);
        Ok(())
    }

    async fn get_tracks(&self, playlist_id: PlaylistId) -> Result<Vec<Track>> {
        self.check("get_tracks")?;
        let gate = self.track_gates.lock().unwrap().remove(&playlist_id);
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let s = self.state();
        Ok(s.members
            .iter()
            .enumerate()
            .filter(|(_, (p, _))| *p == playlist_id)
            .map(|(row, (_, song))| {
                let mut track = s.songs[song].clone();
                track.ps_id = Some(row as i64 + 1);
                track
            })
            .collect())
    }

    async fn export_tracks(
        &self,
        playlist_id: PlaylistId,
        format: Option<&AudioFormat>,
    ) -> Result<ExportedTracks> {
        self.check("export_tracks")?;
        let s = self.state();
        let tracks: Vec<String> = s
            .playlist_songs(playlist_id)
            .iter()
            .map(|id| &s.songs[id])
            .filter(|t| format.map_or(true, |f| &t.format == f))
            .map(|t| {
                if t.artist.is_empty() {
                    t.title.clone()
                } else {
                    format!("{} - {}", t.artist, t.title)
                }
            })
            .collect();
        Ok(ExportedTracks {
            count: tracks.len(),
            tracks,
        })
    }

    async fn update_track_format(&self, song_id: SongId, format: &AudioFormat) -> Result<()> {
        self.check("update_track_format")?;
        let mut s = self.state();
        s.format_calls.push((song_id, format.clone()));
        if let Some(track) = s.songs.get_mut(&song_id) {
            track.format = format.clone();
        }
        Ok(())
    }

    async fn update_track_aiff(&self, song_id: SongId, has_aiff: bool) -> Result<()> {
        self.check("update_track_aiff")?;
        if let Some(track) = self.state().songs.get_mut(&song_id) {
            track.has_aiff = has_aiff;
        }
        Ok(())
    }

    async fn bulk_update_format(&self, format: &AudioFormat, target: &BulkTarget) -> Result<()> {
        self.check("bulk_update_format")?;
        self.state()
            .bulk_calls
            .push((format.clone(), target.clone()));
        let gate = self.bulk_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
            return Err(Error::Backend("Bulk update timed out".into()));
        }
        let mut s = self.state();
        if s.reject_bulk_format.as_ref() == Some(format) {
            return Err(Error::Backend(format!("Refusing {}", format)));
        }
        let ids = match target {
            BulkTarget::Songs(ids) => ids.clone(),
            BulkTarget::Playlist(p) => s.playlist_songs(*p),
        };
        for id in ids {
            if let Some(track) = s.songs.get_mut(&id) {
                track.format = format.clone();
            }
        }
        Ok(())
    }

    async fn get_song_playlists(&self, song_id: SongId) -> Result<Vec<SongPlaylist>> {
        self.check("get_song_playlists")?;
        let s = self.state();
        let mut list: Vec<SongPlaylist> = s
            .playlists
            .iter()
            .map(|(id, name)| SongPlaylist {
                id: *id,
                name: name.clone(),
                member: s.members.contains(&(*id, song_id)),
            })
            .collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(list)
    }

    async fn update_song_playlists(
        &self,
        song_id: SongId,
        add: &[PlaylistId],
        remove: &[PlaylistId],
    ) -> Result<()> {
        self.check("update_song_playlists")?;
        let mut s = self.state();
        for p in add {
            if !s.members.contains(&(*p, song_id)) {
                s.members.push((*p, song_id));
            }
        }
        s.members
            .retain(|(p, song)| !(*song == song_id && remove.contains(p)));
        Ok(())
    }

    async fn get_watch_config(&self) -> Result<WatchConfig> {
        self.check("get_watch_config")?;
        Ok(self.state().watch.clone())
    }

    async fn set_watch_config(&self, update: &WatchConfigUpdate) -> Result<WatchConfig> {
        self.check("set_watch_config")?;
        let mut s = self.state();
        s.watch.path = update.path.clone();
        s.watch.output_folder = update.output_folder.clone();
        s.watch.auto_convert = update.auto_convert;
        // the save reply has no queue_size
        Ok(WatchConfig {
            queue_size: 0,
            ..s.watch.clone()
        })
    }

    async fn scan_folder(&self) -> Result<ScanResult> {
        self.check("scan_folder")?;
        let mut s = self.state();
        if s.watch.path.is_empty() {
            return Err(Error::Backend("No watch folder configured".into()));
        }
        let found = std::mem::take(&mut s.scan_files);
        let scanned = found.len() + s.downloads.len();
        let added = found.len();
        s.downloads.extend(found);
        Ok(ScanResult { scanned, added })
    }

    async fn browse_folder(&self) -> Result<Option<String>> {
        self.check("browse_folder")?;
        Ok(self.state().browse_result.clone())
    }

    async fn list_downloads(&self) -> Result<Vec<Download>> {
        self.check("list_downloads")?;
        let mut s = self.state();
        s.list_downloads_calls += 1;
        Ok(s.downloads.clone())
    }

    async fn delete_download(&self, id: DownloadId) -> Result<()> {
        self.check("delete_download")?;
        self.state().downloads.retain(|d| d.id != id);
        Ok(())
    }

    async fn list_conversions(&self) -> Result<Vec<Conversion>> {
        self.check("list_conversions")?;
        Ok(self
            .state()
            .downloads
            .iter()
            .filter_map(|d| {
                d.conv_id.map(|id| Conversion {
                    id,
                    download_id: Some(d.id),
                    source_path: d.filepath.clone(),
                    output_path: String::new(),
                    source_ext: d.extension.clone(),
                    status: d.conv_status,
                    error_msg: d.conv_error.clone().unwrap_or_default(),
                    size_mb: 0.0,
                    started_at: None,
                    finished_at: None,
                    created_at: None,
                })
            })
            .collect())
    }

    async fn conversion_stats(&self) -> Result<ConversionStats> {
        self.check("conversion_stats")?;
        let s = self.state();
        let mut stats = ConversionStats {
            queue_size: s.watch.queue_size,
            worker_running: s.watch.converter_running,
            ..ConversionStats::default()
        };
        for d in &s.downloads {
            match d.conv_status {
                ConversionStatus::Pending => stats.pending += 1,
                ConversionStatus::Converting => stats.converting += 1,
                ConversionStatus::Done => stats.done += 1,
                ConversionStatus::Failed => stats.failed += 1,
                ConversionStatus::Skipped => stats.skipped += 1,
                ConversionStatus::Unset => {}
            }
        }
        Ok(stats)
    }

    async fn retry_conversion(&self, id: ConversionId) -> Result<()> {
        self.check("retry_conversion")?;
        let mut s = self.state();
        let Some(download) = s.downloads.iter_mut().find(|d| d.conv_id == Some(id)) else {
            return Err(Error::Backend("Conversion not found".into()));
        };
        if download.conv_status != ConversionStatus::Failed {
            return Err(Error::Backend("Can only retry failed conversions".into()));
        }
        download.conv_status = ConversionStatus::Pending;
        download.conv_error = Some(String::new());
        Ok(())
    }

    async fn convert_download(&self, id: DownloadId) -> Result<ConversionId> {
        self.check("convert_download")?;
        let mut s = self.state();
        s.convert_calls.push(id);
        if s.watch.output_folder.is_empty() {
            return Err(Error::Backend("No output folder configured".into()));
        }
        let conversion = s.next_id();
        let Some(download) = s.downloads.iter_mut().find(|d| d.id == id) else {
            return Err(Error::Backend("Download not found".into()));
        };
        download.conv_status = ConversionStatus::Pending;
        download.conv_id = Some(conversion);
        Ok(conversion)
    }

    async fn recent_logs(&self, n: usize) -> Result<Vec<String>> {
        self.check("recent_logs")?;
        let s = self.state();
        let start = s.logs.len().saturating_sub(n);
        Ok(s.logs[start..].to_vec())
    }
}

/// Session over `fake` with a short poll interval
pub fn session(fake: &Arc<FakeBackend>) -> Session {
    let settings = SessionSettings {
        poll_interval: Duration::from_millis(20),
        ..SessionSettings::default()
    };
    Session::with_settings(fake.clone(), settings)
}

/// Everything received so far, without waiting
pub fn drain(rx: &mut broadcast::Receiver<StateEvent>) -> Vec<StateEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
