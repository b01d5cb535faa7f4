//! Data models for the Ordnung backend
//!
//! Rows come straight out of the backend's SQL layer, so decoding is
//! lenient: integer booleans, numeric text columns and NULLs are all
//! accepted and normalized here.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

pub type PlaylistId = i64;
pub type SongId = i64;
pub type DownloadId = i64;
pub type ConversionId = i64;

// ============================================================================
// Audio formats
// ============================================================================

/// Known target formats, in the order the backend lists them
pub const AUDIO_FORMATS: &[AudioFormat] = &[
    AudioFormat::Mp3,
    AudioFormat::Flac,
    AudioFormat::Wav,
    AudioFormat::Aiff,
    AudioFormat::Ogg,
    AudioFormat::M4a,
    AudioFormat::Alac,
    AudioFormat::Wma,
    AudioFormat::Aac,
];

/// Target audio format assigned to a track
///
/// Values the client does not know are kept in `Other`, trimmed and
/// lower-cased like the known ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AudioFormat {
    Mp3,
    Flac,
    Wav,
    Aiff,
    Ogg,
    M4a,
    Alac,
    Wma,
    Aac,
    Other(String),
}

impl AudioFormat {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Mp3 => "mp3",
            Self::Flac => "flac",
            Self::Wav => "wav",
            Self::Aiff => "aiff",
            Self::Ogg => "ogg",
            Self::M4a => "m4a",
            Self::Alac => "alac",
            Self::Wma => "wma",
            Self::Aac => "aac",
            Self::Other(s) => s,
        }
    }

    /// Parse a raw format string (trimmed, case-insensitive). Empty means mp3.
    pub fn parse(raw: &str) -> Self {
        let s = raw.trim().to_lowercase();
        match s.as_str() {
            "" | "mp3" => Self::Mp3,
            "flac" => Self::Flac,
            "wav" => Self::Wav,
            "aiff" => Self::Aiff,
            "ogg" => Self::Ogg,
            "m4a" => Self::M4a,
            "alac" => Self::Alac,
            "wma" => Self::Wma,
            "aac" => Self::Aac,
            _ => Self::Other(s),
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }

    /// Grouping class used for badges and format tallies
    pub fn class(&self) -> FormatClass {
        match self {
            Self::Mp3 => FormatClass::Mp3,
            Self::Flac => FormatClass::Flac,
            Self::Wav => FormatClass::Wav,
            Self::Aiff => FormatClass::Aiff,
            Self::Ogg => FormatClass::Ogg,
            Self::M4a => FormatClass::M4a,
            Self::Alac => FormatClass::Alac,
            Self::Wma => FormatClass::Wma,
            Self::Aac => FormatClass::Aac,
            Self::Other(s) => match s.as_str() {
                "aif" => FormatClass::Aiff,
                "opus" => FormatClass::Ogg,
                _ => FormatClass::Other,
            },
        }
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::Mp3
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for AudioFormat {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl Serialize for AudioFormat {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AudioFormat {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().map(Self::parse).unwrap_or_default())
    }
}

/// Display/grouping class of a format: aliases fold into their family,
/// anything unrecognized is `Other`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FormatClass {
    Mp3,
    Flac,
    Wav,
    Aiff,
    Ogg,
    M4a,
    Alac,
    Wma,
    Aac,
    Other,
}

impl FormatClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Flac => "flac",
            Self::Wav => "wav",
            Self::Aiff => "aiff",
            Self::Ogg => "ogg",
            Self::M4a => "m4a",
            Self::Alac => "alac",
            Self::Wma => "wma",
            Self::Aac => "aac",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for FormatClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Conversion status
// ============================================================================

/// Lifecycle of a download's conversion job
///
/// `unset → pending → converting → {done | failed | skipped}`, plus the
/// explicit `failed → pending` on retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConversionStatus {
    #[default]
    Unset,
    Pending,
    Converting,
    Done,
    Failed,
    Skipped,
}

impl ConversionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unset => "",
            Self::Pending => "pending",
            Self::Converting => "converting",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "pending" => Self::Pending,
            "converting" => Self::Converting,
            "done" => Self::Done,
            "failed" => Self::Failed,
            "skipped" => Self::Skipped,
            "" => Self::Unset,
            other => {
                tracing::debug!("Unknown conversion status '{}', treating as unset", other);
                Self::Unset
            }
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Unset => 0,
            Self::Pending => 1,
            Self::Converting => 2,
            Self::Done | Self::Failed | Self::Skipped => 3,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.rank() == 3
    }

    /// Whether the client may move a job from `self` to `next` locally
    pub fn can_transition_to(&self, next: ConversionStatus) -> bool {
        match (self, next) {
            (a, b) if *a == b => true,
            (Self::Failed, Self::Pending) => true,
            _ => next.rank() > self.rank(),
        }
    }

    /// Candidates for "convert all": never converted, or failed
    pub fn needs_conversion(&self) -> bool {
        matches!(self, Self::Unset | Self::Failed)
    }
}

impl fmt::Display for ConversionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unset => f.write_str("unset"),
            other => f.write_str(other.as_str()),
        }
    }
}

impl Serialize for ConversionStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Unset => serializer.serialize_none(),
            other => serializer.serialize_str(other.as_str()),
        }
    }
}

impl<'de> Deserialize<'de> for ConversionStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().map(Self::parse).unwrap_or_default())
    }
}

// ============================================================================
// Lenient field decoding
// ============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum Loose {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// Accepts `true`/`false`, `0`/`1` and `"0"`/`"1"`; NULL is false
pub(crate) fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(match Option::<Loose>::deserialize(deserializer)? {
        None => false,
        Some(Loose::Bool(b)) => b,
        Some(Loose::Int(i)) => i != 0,
        Some(Loose::Float(f)) => f != 0.0,
        Some(Loose::Str(s)) => matches!(s.trim(), "1" | "true" | "True"),
    })
}

/// Accepts text or numbers; NULL is the empty string
pub(crate) fn lenient_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<String, D::Error> {
    Ok(match Option::<Loose>::deserialize(deserializer)? {
        None => String::new(),
        Some(Loose::Bool(b)) => b.to_string(),
        Some(Loose::Int(i)) => i.to_string(),
        Some(Loose::Float(f)) => f.to_string(),
        Some(Loose::Str(s)) => s,
    })
}

/// Accepts numbers or numeric text; NULL and garbage are 0
pub(crate) fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(match Option::<Loose>::deserialize(deserializer)? {
        Some(Loose::Int(i)) => i as f64,
        Some(Loose::Float(f)) => f,
        Some(Loose::Str(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    })
}

// ============================================================================
// Library entities
// ============================================================================

/// Imported playlist with its per-format tally
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
    pub id: PlaylistId,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default)]
    pub total: usize,
    #[serde(default)]
    pub format_counts: BTreeMap<String, usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imported_at: Option<String>,
}

/// A song as seen within a playlist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub song_id: SongId,
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub artist: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub album: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub genre: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub bpm: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub key_sig: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub time: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub rating: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub date_added: String,
    #[serde(default)]
    pub format: AudioFormat,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub has_aiff: bool,
    /// Row id of the playlist membership this track was listed through
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ps_id: Option<i64>,
}

impl Track {
    /// Minimal track, mostly useful for tests and fakes
    pub fn new(song_id: SongId, title: impl Into<String>) -> Self {
        Self {
            song_id,
            title: title.into(),
            artist: String::new(),
            album: String::new(),
            genre: String::new(),
            bpm: String::new(),
            key_sig: String::new(),
            time: String::new(),
            rating: String::new(),
            date_added: String::new(),
            format: AudioFormat::Mp3,
            has_aiff: false,
            ps_id: None,
        }
    }

    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = artist.into();
        self
    }

    pub fn with_genre(mut self, genre: impl Into<String>) -> Self {
        self.genre = genre.into();
        self
    }

    pub fn with_format(mut self, format: AudioFormat) -> Self {
        self.format = format;
        self
    }
}

/// Playlist entry in a song's membership list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongPlaylist {
    pub id: PlaylistId,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub member: bool,
}

/// Result of importing one playlist export
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportedPlaylist {
    pub id: PlaylistId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub track_count: usize,
}

/// Export listing of a playlist ("Artist - Title" lines)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExportedTracks {
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub tracks: Vec<String>,
}

impl ExportedTracks {
    /// Text listing, one track per line
    pub fn render(&self) -> String {
        if self.tracks.is_empty() {
            "no tracks match".to_string()
        } else {
            self.tracks.join("\n")
        }
    }
}

/// File name used when saving an export
pub fn export_file_name(format: Option<&AudioFormat>) -> String {
    match format {
        Some(f) => format!("{}_tracks.txt", f.as_str()),
        None => "all_tracks.txt".to_string(),
    }
}

// ============================================================================
// Downloads and conversions
// ============================================================================

/// File found in the watch folder, joined with its conversion job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Download {
    pub id: DownloadId,
    #[serde(default, deserialize_with = "lenient_string")]
    pub filename: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub filepath: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub extension: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub size_mb: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detected_at: Option<String>,
    #[serde(default)]
    pub conv_status: ConversionStatus,
    #[serde(default)]
    pub conv_id: Option<ConversionId>,
    #[serde(default)]
    pub conv_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conv_output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conv_size: Option<f64>,
}

impl Download {
    pub fn new(id: DownloadId, filename: impl Into<String>) -> Self {
        let filename = filename.into();
        let extension = filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_lowercase())
            .unwrap_or_default();
        Self {
            id,
            filepath: filename.clone(),
            filename,
            extension,
            size_mb: 0.0,
            detected_at: None,
            conv_status: ConversionStatus::Unset,
            conv_id: None,
            conv_error: None,
            conv_output: None,
            conv_size: None,
        }
    }

    /// Error text of the job, if any non-empty one is present
    pub fn error_message(&self) -> Option<&str> {
        self.conv_error.as_deref().filter(|e| !e.is_empty())
    }
}

/// Watch-folder settings and converter state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchConfig {
    #[serde(default, deserialize_with = "lenient_string")]
    pub path: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub output_folder: String,
    #[serde(default = "default_true", deserialize_with = "lenient_bool")]
    pub auto_convert: bool,
    /// Folder watcher running
    #[serde(default, deserialize_with = "lenient_bool")]
    pub active: bool,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub converter_running: bool,
    /// Not part of the save response; preserved locally across saves
    #[serde(default)]
    pub queue_size: usize,
}

fn default_true() -> bool {
    true
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            output_folder: String::new(),
            auto_convert: true,
            active: false,
            converter_running: false,
            queue_size: 0,
        }
    }
}

/// Body of a watch-config save
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WatchConfigUpdate {
    pub path: String,
    pub output_folder: String,
    pub auto_convert: bool,
}

impl WatchConfigUpdate {
    /// Source and output folders, trimmed, with auto-convert off
    pub fn new(path: impl AsRef<str>, output_folder: impl AsRef<str>) -> Self {
        Self {
            path: path.as_ref().trim().to_string(),
            output_folder: output_folder.as_ref().trim().to_string(),
            auto_convert: false,
        }
    }

    pub fn with_auto_convert(mut self, auto_convert: bool) -> Self {
        self.auto_convert = auto_convert;
        self
    }
}

/// Counts returned by a folder scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScanResult {
    #[serde(default)]
    pub scanned: usize,
    #[serde(default)]
    pub added: usize,
}

/// A conversion job row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversion {
    pub id: ConversionId,
    #[serde(default)]
    pub download_id: Option<DownloadId>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub source_path: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub output_path: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub source_ext: String,
    #[serde(default)]
    pub status: ConversionStatus,
    #[serde(default, deserialize_with = "lenient_string")]
    pub error_msg: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub size_mb: f64,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub finished_at: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Per-status job counts plus converter state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConversionStats {
    #[serde(default)]
    pub pending: usize,
    #[serde(default)]
    pub converting: usize,
    #[serde(default)]
    pub done: usize,
    #[serde(default)]
    pub failed: usize,
    #[serde(default)]
    pub skipped: usize,
    #[serde(default)]
    pub queue_size: usize,
    #[serde(default)]
    pub worker_running: bool,
}
