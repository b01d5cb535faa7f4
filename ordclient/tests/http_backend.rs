//! Integration tests for the HTTP backend against a mock server

use ordclient::{
    AudioFormat, Backend, BulkTarget, ConversionStatus, Error, HttpBackend, Session,
    WatchConfigUpdate,
};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_json, body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn backend(server: &MockServer) -> HttpBackend {
    HttpBackend::builder()
        .base_url(format!("{}/", server.uri()))
        .build()
        .unwrap()
}

fn ok() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "ok": true }))
}

#[tokio::test]
async fn test_list_playlists_and_tracks() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/playlists"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "id": 1,
                "name": "Warmup",
                "total": 2,
                "format_counts": { "mp3": 1, "wav": 1 },
                "imported_at": "2024-01-01 10:00:00"
            }
        ])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/playlists/1/tracks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "song_id": 10, "title": "Drive", "artist": "Kit", "album": null,
                "genre": "Techno", "bpm": 128, "key_sig": "8A", "time": "6:12",
                "rating": 4, "date_added": null, "format": "MP3", "has_aiff": 1,
                "ps_id": 3
            },
            { "song_id": 11, "title": "Morning", "format": null, "has_aiff": "0" }
        ])))
        .mount(&server)
        .await;

    let backend = backend(&server);
    let playlists = backend.list_playlists().await.unwrap();
    assert_eq!(playlists.len(), 1);
    assert_eq!(playlists[0].format_counts["wav"], 1);

    let tracks = backend.get_tracks(1).await.unwrap();
    assert_eq!(tracks[0].bpm, "128");
    assert_eq!(tracks[0].rating, "4");
    assert_eq!(tracks[0].album, "");
    assert_eq!(tracks[0].format, AudioFormat::Mp3);
    assert!(tracks[0].has_aiff);
    assert_eq!(tracks[0].ps_id, Some(3));
    assert_eq!(tracks[1].format, AudioFormat::Mp3);
    assert!(!tracks[1].has_aiff);
}

#[tokio::test]
async fn test_error_body_is_a_business_error() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/api/songs/5/format"))
        .and(body_json(json!({ "format": "opus" })))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({ "error": "Invalid format" })),
        )
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/downloads/scan"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "error": "No watch folder configured" })),
        )
        .mount(&server)
        .await;

    let backend = backend(&server);
    let err = backend
        .update_track_format(5, &AudioFormat::parse("opus"))
        .await
        .unwrap_err();
    assert!(matches!(&err, Error::Backend(msg) if msg == "Invalid format"));

    let err = backend.scan_folder().await.unwrap_err();
    assert_eq!(err.to_string(), "No watch folder configured");
}

#[tokio::test]
async fn test_server_failure_is_a_transport_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/downloads"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/conversions/stats"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let backend = backend(&server);
    let err = backend.list_downloads().await.unwrap_err();
    assert!(matches!(err, Error::Http(_)));
    assert!(err.is_transport());

    let err = backend.conversion_stats().await.unwrap_err();
    assert!(err.is_transport());
}

#[tokio::test]
async fn test_bulk_format_request_bodies() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/api/songs/bulk-format"))
        .and(body_json(json!({ "format": "flac", "ids": [1, 2] })))
        .respond_with(ok())
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/api/songs/bulk-format"))
        .and(body_json(json!({ "format": "wav", "playlist_id": 7 })))
        .respond_with(ok())
        .expect(1)
        .mount(&server)
        .await;

    let backend = backend(&server);
    backend
        .bulk_update_format(&AudioFormat::Flac, &BulkTarget::Songs(vec![1, 2]))
        .await
        .unwrap();
    backend
        .bulk_update_format(&AudioFormat::Wav, &BulkTarget::Playlist(7))
        .await
        .unwrap();

    // never sent: the backend would treat it as "all songs"
    assert!(backend
        .bulk_update_format(&AudioFormat::Wav, &BulkTarget::Songs(Vec::new()))
        .await
        .is_err());
}

#[tokio::test]
async fn test_song_membership_routes() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/songs/3/playlists"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 2, "name": "Peak", "member": 1 },
            { "id": 1, "name": "Warmup", "member": 0 }
        ])))
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/api/songs/3/playlists"))
        .and(body_json(json!({ "add": [1], "remove": [] })))
        .respond_with(ok())
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/api/songs/3/has-aiff"))
        .and(body_json(json!({ "has_aiff": true })))
        .respond_with(ok())
        .expect(1)
        .mount(&server)
        .await;

    let backend = backend(&server);
    let list = backend.get_song_playlists(3).await.unwrap();
    assert!(list[0].member);
    assert!(!list[1].member);

    backend.update_song_playlists(3, &[1], &[]).await.unwrap();
    backend.update_track_aiff(3, true).await.unwrap();
}

#[tokio::test]
async fn test_import_and_export() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/playlists/import"))
        .and(body_string_contains("friday.txt"))
        .and(body_string_contains("Friday Night"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 9, "name": "Friday Night", "track_count": 2
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/playlists/9/export"))
        .and(query_param("format", "wav"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": 1, "tracks": ["Ana - Morning"]
        })))
        .mount(&server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/api/playlists/9"))
        .respond_with(ok())
        .expect(1)
        .mount(&server)
        .await;

    let backend = backend(&server);
    let imported = backend
        .import_playlist("friday.txt", b"One\nTwo\n".to_vec(), Some("Friday Night"))
        .await
        .unwrap();
    assert_eq!(imported.id, 9);
    assert_eq!(imported.track_count, 2);

    let export = backend
        .export_tracks(9, Some(&AudioFormat::Wav))
        .await
        .unwrap();
    assert_eq!(export.render(), "Ana - Morning");

    backend.delete_playlist(9).await.unwrap();
}

#[tokio::test]
async fn test_downloads_and_conversions() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/downloads"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "id": 1, "filename": "a.wav", "filepath": "/in/a.wav", "extension": "wav",
                "size_mb": "12.5", "conv_status": null, "conv_id": null, "conv_error": null
            },
            {
                "id": 2, "filename": "b.aiff", "size_mb": 3,
                "conv_status": "failed", "conv_id": 4, "conv_error": "ffmpeg exited with 1"
            },
            { "id": 3, "filename": "c.flac", "conv_status": "archived" }
        ])))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/conversions/convert/1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "conversion_id": 12 })),
        )
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/conversions/retry/4"))
        .respond_with(ok())
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/api/downloads/3"))
        .respond_with(ok())
        .expect(1)
        .mount(&server)
        .await;

    let backend = backend(&server);
    let downloads = backend.list_downloads().await.unwrap();
    assert_eq!(downloads[0].size_mb, 12.5);
    assert_eq!(downloads[0].conv_status, ConversionStatus::Unset);
    assert_eq!(downloads[1].conv_status, ConversionStatus::Failed);
    assert_eq!(downloads[1].error_message(), Some("ffmpeg exited with 1"));
    // unknown statuses degrade to "never converted"
    assert_eq!(downloads[2].conv_status, ConversionStatus::Unset);

    assert_eq!(backend.convert_download(1).await.unwrap(), 12);
    backend.retry_conversion(4).await.unwrap();
    backend.delete_download(3).await.unwrap();
}

#[tokio::test]
async fn test_watch_config_and_browse() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/api/downloads/config"))
        .and(body_json(json!({
            "path": "/in", "output_folder": "/out", "auto_convert": false
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "path": "/in", "output_folder": "/out", "auto_convert": 0,
            "active": true, "converter_running": true
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/browse-folder"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "path": "" })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/logs/recent"))
        .and(query_param("n", "80"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "lines": ["2024-01-01 10:00:00 [INFO] ready"]
        })))
        .mount(&server)
        .await;

    let backend = backend(&server);
    let saved = backend
        .set_watch_config(&WatchConfigUpdate::new(" /in ", "/out "))
        .await
        .unwrap();
    assert!(saved.converter_running);
    assert_eq!(saved.queue_size, 0);

    assert_eq!(backend.browse_folder().await.unwrap(), None);
    assert_eq!(backend.recent_logs(80).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_session_over_http() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/playlists"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 1, "name": "Warmup", "total": 1, "format_counts": { "wav": 1 } }
        ])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/playlists/1/tracks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "song_id": 4, "title": "Morning", "artist": "Ana", "format": "wav" }
        ])))
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/api/songs/4/format"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({ "error": "Invalid format" })),
        )
        .mount(&server)
        .await;

    let session = Session::new(Arc::new(backend(&server)));
    session.load_playlists().await.unwrap();
    session.select_playlist(1).await.unwrap();
    assert_eq!(session.tracks()[0].format, AudioFormat::Wav);

    let err = session.set_format(4, AudioFormat::Flac).await.unwrap_err();
    assert!(err.is_backend());
    assert_eq!(session.tracks()[0].format, AudioFormat::Wav);
    assert_eq!(
        session.activity().last().map(|e| e.message.clone()),
        Some("ERROR: Invalid format".to_string())
    );
}
