//! Single-slot undo journal for bulk format changes
//!
//! Only the most recent bulk change can be reverted. Capturing a new
//! snapshot discards the previous one; taking it empties the slot.

use crate::models::{AudioFormat, SongId, Track};
use std::collections::HashMap;

/// Format a song had before a bulk change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoEntry {
    pub song_id: SongId,
    pub prior: AudioFormat,
}

/// Prior formats of every song touched by one bulk change, in capture order
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UndoSnapshot {
    entries: Vec<UndoEntry>,
}

impl UndoSnapshot {
    pub fn capture<'a, I>(tracks: I) -> Self
    where
        I: IntoIterator<Item = &'a Track>,
    {
        Self {
            entries: tracks
                .into_iter()
                .map(|t| UndoEntry {
                    song_id: t.song_id,
                    prior: t.format.clone(),
                })
                .collect(),
        }
    }

    pub fn entries(&self) -> &[UndoEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Song ids grouped by the format they had, one group per distinct
    /// prior format, in first-seen order
    pub fn groups(&self) -> Vec<(AudioFormat, Vec<SongId>)> {
        let mut groups: Vec<(AudioFormat, Vec<SongId>)> = Vec::new();
        for entry in &self.entries {
            match groups.iter_mut().find(|(f, _)| *f == entry.prior) {
                Some((_, ids)) => ids.push(entry.song_id),
                None => groups.push((entry.prior.clone(), vec![entry.song_id])),
            }
        }
        groups
    }

    /// Prior format by song id
    pub fn lookup(&self) -> HashMap<SongId, AudioFormat> {
        self.entries
            .iter()
            .map(|e| (e.song_id, e.prior.clone()))
            .collect()
    }
}

/// Depth-one undo buffer
///
/// Every change to the slot bumps a generation counter, so a caller can
/// tell whether the snapshot it captured is still the one stored.
#[derive(Debug, Default)]
pub struct UndoBuffer {
    slot: Option<UndoSnapshot>,
    generation: u64,
}

impl UndoBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `snapshot`, returning its generation and the snapshot it
    /// replaced
    pub fn capture(&mut self, snapshot: UndoSnapshot) -> (u64, Option<UndoSnapshot>) {
        self.generation += 1;
        (self.generation, self.slot.replace(snapshot))
    }

    /// Put `previous` back, but only if the slot was not touched since the
    /// capture identified by `generation`
    pub fn roll_back(&mut self, generation: u64, previous: Option<UndoSnapshot>) -> bool {
        if self.generation != generation {
            return false;
        }
        self.generation += 1;
        self.slot = previous;
        true
    }

    /// Consume the stored snapshot
    pub fn take(&mut self) -> Option<UndoSnapshot> {
        self.generation += 1;
        self.slot.take()
    }

    pub fn peek(&self) -> Option<&UndoSnapshot> {
        self.slot.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_available(&self) -> bool {
        self.slot.is_some()
    }

    pub fn clear(&mut self) {
        self.generation += 1;
        self.slot = None;
    }
}
