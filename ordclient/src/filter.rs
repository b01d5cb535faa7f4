//! Derived views over the cached track collection
//!
//! Everything here is a pure function of its inputs. Matching is
//! case-insensitive and substring-based throughout.

use crate::models::{FormatClass, Track};
use std::collections::HashMap;

/// Delimiters separating genres inside one genre field
const GENRE_DELIMITERS: &[char] = &[';', ',', '/'];

/// Split a genre field into trimmed, lower-cased, non-empty tokens
pub fn genre_tokens(genre: &str) -> impl Iterator<Item = String> + '_ {
    genre
        .split(GENRE_DELIMITERS)
        .map(|part| part.trim().to_lowercase())
        .filter(|part| !part.is_empty())
}

fn haystack(track: &Track) -> String {
    format!(
        "{} {} {} {} {}",
        track.title, track.artist, track.album, track.genre, track.key_sig
    )
    .to_lowercase()
}

/// Whether a track passes the search text and the genre facet
pub fn track_matches(track: &Track, search: &str, genre_filter: &str) -> bool {
    let search = search.to_lowercase();
    let genre_filter = genre_filter.trim().to_lowercase();

    if !search.is_empty() && !haystack(track).contains(&search) {
        return false;
    }
    if !genre_filter.is_empty() && !genre_tokens(&track.genre).any(|g| g.contains(&genre_filter))
    {
        return false;
    }
    true
}

/// Tracks matching `search` and `genre_filter`, in their original order
pub fn filter_tracks<'a, I>(tracks: I, search: &str, genre_filter: &str) -> Vec<&'a Track>
where
    I: IntoIterator<Item = &'a Track>,
{
    tracks
        .into_iter()
        .filter(|t| track_matches(t, search, genre_filter))
        .collect()
}

/// The `k` most frequent genre tokens
///
/// Single-character tokens are dropped. Ties keep first-encountered order.
pub fn top_genres(tracks: &[Track], k: usize) -> Vec<String> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for token in tracks
        .iter()
        .flat_map(|t| genre_tokens(&t.genre))
        .filter(|g| g.chars().count() > 1)
    {
        match index.get(&token) {
            Some(&i) => counts[i].1 += 1,
            None => {
                index.insert(token.clone(), counts.len());
                counts.push((token, 1));
            }
        }
    }

    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts.into_iter().take(k).map(|(g, _)| g).collect()
}

/// Track count per format class, most frequent first
///
/// Unknown formats fall into [`FormatClass::Other`].
pub fn format_counts(tracks: &[Track]) -> Vec<(FormatClass, usize)> {
    let mut counts: Vec<(FormatClass, usize)> = Vec::new();
    for class in tracks.iter().map(|t| t.format.class()) {
        match counts.iter_mut().find(|(c, _)| *c == class) {
            Some((_, n)) => *n += 1,
            None => counts.push((class, 1)),
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
}
