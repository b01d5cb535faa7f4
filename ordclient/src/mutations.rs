//! Format and AIFF edits with a one-step undo for bulk changes
//!
//! Every edit waits for the backend to accept it before touching the cache.
//! A rejected edit leaves the cache as it was and is reported in the
//! activity log.

use crate::backend::BulkTarget;
use crate::error::{Error, Result};
use crate::models::{AudioFormat, SongId};
use crate::session::{Session, StateEvent};
use crate::undo::UndoSnapshot;
use futures::future::join_all;
use std::collections::HashMap;

impl Session {
    /// Reload playlist totals after an edit; failures only get logged
    pub(crate) async fn refresh_playlists(&self) {
        if let Err(e) = self.load_playlists().await {
            tracing::warn!("Failed to refresh playlists: {}", e);
        }
    }

    // ========================================================================
    // Single-track edits
    // ========================================================================

    /// Change the target format of one song
    pub async fn set_format(&self, song_id: SongId, format: AudioFormat) -> Result<()> {
        if self.state().cache.track(song_id).is_none() {
            return Err(Error::TrackNotFound(song_id));
        }

        self.backend()
            .update_track_format(song_id, &format)
            .await
            .map_err(|e| self.report(e))?;

        tracing::debug!("Song {} format set to {}", song_id, format);
        self.state().cache.set_track_format(song_id, &format);
        self.emit(StateEvent::TracksChanged);
        self.refresh_playlists().await;
        Ok(())
    }

    /// Set the "already have an AIFF copy" flag of one song
    pub async fn set_aiff(&self, song_id: SongId, has_aiff: bool) -> Result<()> {
        if self.state().cache.track(song_id).is_none() {
            return Err(Error::TrackNotFound(song_id));
        }

        self.backend()
            .update_track_aiff(song_id, has_aiff)
            .await
            .map_err(|e| self.report(e))?;

        self.state().cache.set_track_aiff(song_id, has_aiff);
        self.emit(StateEvent::TracksChanged);
        Ok(())
    }

    /// Flip the AIFF flag, returning the new value
    pub async fn toggle_aiff(&self, song_id: SongId) -> Result<bool> {
        let current = self
            .state()
            .cache
            .track(song_id)
            .map(|t| t.has_aiff)
            .ok_or(Error::TrackNotFound(song_id))?;
        self.set_aiff(song_id, !current).await?;
        Ok(!current)
    }

    // ========================================================================
    // Bulk edits
    // ========================================================================

    /// Set `format` on many songs at once
    ///
    /// With `ids`, exactly those songs are changed; without, every song of
    /// the active playlist. The prior formats of the affected cached tracks
    /// are captured as the undo snapshot before the request is sent,
    /// replacing any earlier snapshot. Returns the number of cached tracks
    /// updated.
    pub async fn bulk_set_format(
        &self,
        format: AudioFormat,
        ids: Option<Vec<SongId>>,
    ) -> Result<usize> {
        let (target, generation, replaced) = {
            let mut state = self.state();
            let (target, snapshot) = match ids {
                Some(ids) => {
                    let snapshot = UndoSnapshot::capture(
                        state
                            .cache
                            .tracks()
                            .iter()
                            .filter(|t| ids.contains(&t.song_id)),
                    );
                    (BulkTarget::Songs(ids), snapshot)
                }
                None => {
                    let playlist = state
                        .cache
                        .active_playlist()
                        .ok_or(Error::NoActivePlaylist)?;
                    let snapshot = UndoSnapshot::capture(state.cache.tracks());
                    (BulkTarget::Playlist(playlist), snapshot)
                }
            };
            if target.is_empty() {
                tracing::debug!("Bulk format change with no songs, ignoring");
                return Ok(0);
            }
            let (generation, replaced) = state.undo.capture(snapshot);
            (target, generation, replaced)
        };
        self.emit(StateEvent::UndoChanged);

        if let Err(err) = self.backend().bulk_update_format(&format, &target).await {
            // only roll back if the slot was not touched meanwhile
            if self.state().undo.roll_back(generation, replaced) {
                self.emit(StateEvent::UndoChanged);
            }
            return Err(self.report(err));
        }

        let updated = {
            let mut state = self.state();
            match &target {
                BulkTarget::Songs(ids) => state.cache.set_formats(ids, &format),
                BulkTarget::Playlist(id) if state.cache.active_playlist() == Some(*id) => {
                    state.cache.set_all_formats(&format)
                }
                BulkTarget::Playlist(_) => 0,
            }
        };
        tracing::info!(
            "Bulk format change to {}: {} cached tracks updated",
            format,
            updated
        );
        self.emit(StateEvent::TracksChanged);
        self.refresh_playlists().await;
        Ok(updated)
    }

    /// Bulk change restricted to the currently visible (filtered) tracks
    pub async fn bulk_set_visible_format(&self, format: AudioFormat) -> Result<usize> {
        let ids: Vec<SongId> = self.visible_tracks().iter().map(|t| t.song_id).collect();
        self.bulk_set_format(format, Some(ids)).await
    }

    /// Whether a bulk change can be reverted
    pub fn undo_available(&self) -> bool {
        self.state().undo.is_available()
    }

    /// Revert the last bulk format change
    ///
    /// Sends one restore request per distinct prior format, all at once,
    /// then writes the prior formats back into the cache for every group the
    /// backend accepted. The snapshot is consumed even if some requests
    /// fail; the first failure is returned after all are logged. Without a
    /// snapshot this is a no-op returning 0.
    pub async fn undo_bulk_format(&self) -> Result<usize> {
        let Some(snapshot) = self.state().undo.take() else {
            return Ok(0);
        };
        self.emit(StateEvent::UndoChanged);

        let groups: Vec<(AudioFormat, BulkTarget)> = snapshot
            .groups()
            .into_iter()
            .map(|(format, ids)| (format, BulkTarget::Songs(ids)))
            .collect();
        tracing::info!(
            "Undoing bulk format change: {} songs in {} groups",
            snapshot.len(),
            groups.len()
        );

        let backend = self.backend();
        let results = join_all(
            groups
                .iter()
                .map(|(format, target)| backend.bulk_update_format(format, target)),
        )
        .await;

        let prior = snapshot.lookup();
        let mut lookup: HashMap<SongId, AudioFormat> = HashMap::new();
        let mut failures = Vec::new();
        for ((format, target), result) in groups.iter().zip(results) {
            match (result, target) {
                (Ok(()), BulkTarget::Songs(ids)) => {
                    for id in ids {
                        if let Some(f) = prior.get(id) {
                            lookup.insert(*id, f.clone());
                        }
                    }
                }
                (Ok(()), BulkTarget::Playlist(_)) => {}
                (Err(err), _) => failures.push((format.clone(), err)),
            }
        }

        let restored = self.state().cache.restore_formats(&lookup);
        self.emit(StateEvent::TracksChanged);

        let mut first_error = None;
        for (format, err) in failures {
            tracing::warn!("Undo to {} failed: {}", format, err);
            self.log_activity(format!("ERROR: undo to {} failed: {}", format, err));
            first_error.get_or_insert(err);
        }

        self.refresh_playlists().await;
        match first_error {
            Some(err) => Err(err),
            None => Ok(restored),
        }
    }
}
