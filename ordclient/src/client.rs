//! HTTP client for the Ordnung JSON API
//!
//! [`HttpBackend`] maps every [`Backend`] operation onto one route of the
//! backend's REST API. It is stateless: caching lives in [`crate::Session`].
//!
//! # Example
//!
//! ```no_run
//! use ordclient::{Backend, HttpBackend};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = HttpBackend::builder()
//!         .base_url("http://127.0.0.1:5000")
//!         .build()?;
//!
//!     for playlist in backend.list_playlists().await? {
//!         println!("{} ({} tracks)", playlist.name, playlist.total);
//!     }
//!     Ok(())
//! }
//! ```

use crate::backend::{decode_reply, Backend, BulkFormatRequest, BulkTarget};
use crate::error::{Error, Result};
use crate::models::{
    AudioFormat, Conversion, ConversionId, ConversionStats, Download, DownloadId,
    ExportedTracks, ImportedPlaylist, Playlist, PlaylistId, ScanResult, SongId, SongPlaylist,
    Track, WatchConfig, WatchConfigUpdate,
};
use async_trait::async_trait;
use ordconfig::Config;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;

/// Default backend URL
pub const DEFAULT_BASE_URL: &str = ordconfig::DEFAULT_BACKEND_BASE_URL;

/// Default timeout for HTTP requests (30 seconds)
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = ordconfig::DEFAULT_BACKEND_TIMEOUT_SECS;

/// Default User-Agent
pub const DEFAULT_USER_AGENT: &str = concat!("Ordnung/", env!("CARGO_PKG_VERSION"), " (ordclient)");

/// Backend over the HTTP JSON API
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
    timeout: Duration,
}

#[derive(Deserialize)]
struct LogLines {
    #[serde(default)]
    lines: Vec<String>,
}

#[derive(Deserialize)]
struct BrowseReply {
    #[serde(default)]
    path: String,
}

#[derive(Deserialize)]
struct ConvertReply {
    #[serde(alias = "conversion_id")]
    id: ConversionId,
}

impl HttpBackend {
    /// Create a builder for configuring the backend client
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Build a client from the `backend` section of the configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let timeout = config.get_backend_timeout_secs()?;
        Self::builder()
            .base_url(config.get_backend_base_url())
            .timeout(Duration::from_secs(timeout))
            .build()
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get the internal HTTP client
    pub fn http_client(&self) -> &Client {
        &self.client
    }

    fn url(&self, path: &str) -> Result<Url> {
        Ok(Url::parse(&format!("{}{}", self.base_url, path))?)
    }

    /// Send a request and decode its reply envelope
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request.timeout(self.timeout).send().await?;
        let status = response.status();

        let failure = response.error_for_status_ref().err();
        if let Some(http_err) = failure {
            let body = response.bytes().await?;
            return match serde_json::from_slice::<Value>(&body) {
                Ok(value) if value.get("error").is_some_and(|e| !e.is_null()) => {
                    tracing::debug!("Backend returned {} with error body", status);
                    decode_reply(value)
                }
                _ => Err(Error::Http(http_err)),
            };
        }

        let value: Value = response.json().await?;
        decode_reply(value)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path)?;
        tracing::debug!("GET {}", url);
        self.send(self.client.get(url)).await
    }

    async fn put_json<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T> {
        let url = self.url(path)?;
        tracing::debug!("PUT {}", url);
        self.send(self.client.put(url).json(body)).await
    }

    async fn post<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path)?;
        tracing::debug!("POST {}", url);
        self.send(self.client.post(url)).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let url = self.url(path)?;
        tracing::debug!("DELETE {}", url);
        self.send::<IgnoredAny>(self.client.delete(url)).await?;
        Ok(())
    }
}

#[async_trait]
impl Backend for HttpBackend {
    // ========================================================================
    // Playlists
    // ========================================================================

    async fn list_playlists(&self) -> Result<Vec<Playlist>> {
        self.get("/api/playlists").await
    }

    async fn import_playlist(
        &self,
        file_name: &str,
        contents: Vec<u8>,
        name: Option<&str>,
    ) -> Result<ImportedPlaylist> {
        let mut form = Form::new().part(
            "file",
            Part::bytes(contents).file_name(file_name.to_string()),
        );
        if let Some(name) = name {
            form = form.text("name", name.to_string());
        }
        let url = self.url("/api/playlists/import")?;
        tracing::debug!("POST {} ({})", url, file_name);
        self.send(self.client.post(url).multipart(form)).await
    }

    async fn delete_playlist(&self, id: PlaylistId) -> Result<()> {
        self.delete(&format!("/api/playlists/{}", id)).await
    }

    async fn get_tracks(&self, playlist_id: PlaylistId) -> Result<Vec<Track>> {
        self.get(&format!("/api/playlists/{}/tracks", playlist_id))
            .await
    }

    async fn export_tracks(
        &self,
        playlist_id: PlaylistId,
        format: Option<&AudioFormat>,
    ) -> Result<ExportedTracks> {
        let mut url = self.url(&format!("/api/playlists/{}/export", playlist_id))?;
        if let Some(format) = format {
            url.query_pairs_mut().append_pair("format", format.as_str());
        }
        tracing::debug!("GET {}", url);
        self.send(self.client.get(url)).await
    }

    // ========================================================================
    // Songs
    // ========================================================================

    async fn update_track_format(&self, song_id: SongId, format: &AudioFormat) -> Result<()> {
        self.put_json::<IgnoredAny>(
            &format!("/api/songs/{}/format", song_id),
            &json!({ "format": format.as_str() }),
        )
        .await?;
        Ok(())
    }

    async fn update_track_aiff(&self, song_id: SongId, has_aiff: bool) -> Result<()> {
        self.put_json::<IgnoredAny>(
            &format!("/api/songs/{}/has-aiff", song_id),
            &json!({ "has_aiff": has_aiff }),
        )
        .await?;
        Ok(())
    }

    async fn bulk_update_format(&self, format: &AudioFormat, target: &BulkTarget) -> Result<()> {
        if target.is_empty() {
            return Err(Error::other("Bulk format update needs at least one song"));
        }
        let body = serde_json::to_value(BulkFormatRequest::new(format, target))?;
        self.put_json::<IgnoredAny>("/api/songs/bulk-format", &body)
            .await?;
        Ok(())
    }

    async fn get_song_playlists(&self, song_id: SongId) -> Result<Vec<SongPlaylist>> {
        self.get(&format!("/api/songs/{}/playlists", song_id)).await
    }

    async fn update_song_playlists(
        &self,
        song_id: SongId,
        add: &[PlaylistId],
        remove: &[PlaylistId],
    ) -> Result<()> {
        self.put_json::<IgnoredAny>(
            &format!("/api/songs/{}/playlists", song_id),
            &json!({ "add": add, "remove": remove }),
        )
        .await?;
        Ok(())
    }

    // ========================================================================
    // Watch folder
    // ========================================================================

    async fn get_watch_config(&self) -> Result<WatchConfig> {
        self.get("/api/downloads/config").await
    }

    async fn set_watch_config(&self, update: &WatchConfigUpdate) -> Result<WatchConfig> {
        let body = serde_json::to_value(update)?;
        self.put_json("/api/downloads/config", &body).await
    }

    async fn scan_folder(&self) -> Result<ScanResult> {
        self.post("/api/downloads/scan").await
    }

    async fn browse_folder(&self) -> Result<Option<String>> {
        let reply: BrowseReply = self.post("/api/browse-folder").await?;
        Ok(Some(reply.path).filter(|p| !p.is_empty()))
    }

    // ========================================================================
    // Downloads and conversions
    // ========================================================================

    async fn list_downloads(&self) -> Result<Vec<Download>> {
        self.get("/api/downloads").await
    }

    async fn delete_download(&self, id: DownloadId) -> Result<()> {
        self.delete(&format!("/api/downloads/{}", id)).await
    }

    async fn list_conversions(&self) -> Result<Vec<Conversion>> {
        self.get("/api/conversions").await
    }

    async fn conversion_stats(&self) -> Result<ConversionStats> {
        self.get("/api/conversions/stats").await
    }

    async fn retry_conversion(&self, id: ConversionId) -> Result<()> {
        self.post::<IgnoredAny>(&format!("/api/conversions/retry/{}", id))
            .await?;
        Ok(())
    }

    async fn convert_download(&self, id: DownloadId) -> Result<ConversionId> {
        let reply: ConvertReply = self
            .post(&format!("/api/conversions/convert/{}", id))
            .await?;
        Ok(reply.id)
    }

    // ========================================================================
    // Logs
    // ========================================================================

    async fn recent_logs(&self, n: usize) -> Result<Vec<String>> {
        let reply: LogLines = self.get(&format!("/api/logs/recent?n={}", n)).await?;
        Ok(reply.lines)
    }
}

/// Builder for [`HttpBackend`]
#[derive(Debug)]
pub struct ClientBuilder {
    client: Option<Client>,
    base_url: String,
    timeout: Duration,
    user_agent: String,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            client: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl ClientBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a custom HTTP client
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Set the base URL (a trailing slash is ignored)
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set a custom User-Agent header
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Build the backend client
    pub fn build(self) -> Result<HttpBackend> {
        Url::parse(&self.base_url)?;

        let client = match self.client {
            Some(client) => client,
            None => Client::builder()
                .user_agent(&self.user_agent)
                .timeout(self.timeout)
                .build()?,
        };

        Ok(HttpBackend {
            client,
            base_url: self.base_url,
            timeout: self.timeout,
        })
    }
}
