use ordclient::{init_logging, Session, StateEvent, View};
use ordconfig::get_config;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = get_config();
    let _log = init_logging(&config);

    let session = Session::from_config(&config)?;
    info!("🔌 Backend at {}", config.get_backend_base_url());

    // ========== Library ==========

    if let Err(e) = session.set_view(View::Library).await {
        warn!("⚠️ Failed to load playlists: {}", e);
    }
    let playlists = session.playlists();
    info!("📚 {} playlist(s)", playlists.len());
    for playlist in &playlists {
        info!("  - {} ({} tracks)", playlist.name, playlist.total);
    }

    // ========== Downloads ==========

    let mut events = session.subscribe();
    if let Err(e) = session.set_view(View::Downloads).await {
        warn!("⚠️ Failed to load downloads: {}", e);
    }
    info!("📥 {} download(s)", session.downloads().len());
    if let Some(badge) = session.converter_badge() {
        info!("🎛️ {}", badge);
    }

    info!("Press Ctrl+C to stop...");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(StateEvent::DownloadsChanged) => {
                    info!("📥 {} download(s)", session.downloads().len());
                }
                Ok(StateEvent::WatchConfigChanged) => {
                    if let Some(badge) = session.converter_badge() {
                        tracing::debug!("🎛️ {}", badge);
                    }
                }
                Ok(StateEvent::ActivityChanged) => {
                    if let Some(entry) = session.activity().last() {
                        info!("📝 {}", entry);
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(n)) => {
                    tracing::debug!("Skipped {} state events", n);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    session.stop_poller();
    info!("👋 Stopped");
    Ok(())
}
