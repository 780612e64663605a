use rand::Rng;
use rand::seq::SliceRandom;

use super::SelectionBounds;
use crate::models::Track;

/// Random selection and artist-aware ordering
pub struct Selector;

impl Selector {
    /// Pick between `min_tracks` and `max_tracks` distinct tracks at random
    /// (fewer if the pool is smaller) and order them so the same primary
    /// artist rarely plays twice in a row.
    pub fn select<R: Rng + ?Sized>(
        candidates: &[Track],
        bounds: SelectionBounds,
        rng: &mut R,
    ) -> Vec<Track> {
        if candidates.is_empty() {
            return Vec::new();
        }

        let count = Self::choose_count(candidates.len(), bounds, rng);
        let picked: Vec<Track> = candidates.choose_multiple(rng, count).cloned().collect();

        Self::avoid_consecutive_artists(picked, rng)
    }

    /// Uniform draw from the inclusive bounds, clamped to the pool size
    pub fn choose_count<R: Rng + ?Sized>(
        pool_size: usize,
        bounds: SelectionBounds,
        rng: &mut R,
    ) -> usize {
        let low = bounds.min_tracks.min(bounds.max_tracks);
        let count = rng.gen_range(low..=bounds.max_tracks);
        count.min(pool_size)
    }

    /// Shuffle, then greedily place tracks so neighbours differ in primary artist
    pub fn avoid_consecutive_artists<R: Rng + ?Sized>(
        mut tracks: Vec<Track>,
        rng: &mut R,
    ) -> Vec<Track> {
        tracks.shuffle(rng);
        Self::interleave(tracks)
    }

    /// Greedy one-step lookahead: take the first remaining track whose primary
    /// artist differs from the last placed one, or the next track if none
    /// does. Can leave avoidable repeats when a better order needs deeper
    /// lookahead.
    pub fn interleave(mut pool: Vec<Track>) -> Vec<Track> {
        let mut ordered = Vec::with_capacity(pool.len());

        while !pool.is_empty() {
            let next = match ordered.last() {
                None => 0,
                Some(last) => pool
                    .iter()
                    .position(|candidate| !same_primary_artist(last, candidate))
                    .unwrap_or(0),
            };
            ordered.push(pool.remove(next));
        }

        ordered
    }
}

/// Tracks without a credited artist id never clash
fn same_primary_artist(a: &Track, b: &Track) -> bool {
    match (a.primary_artist(), b.primary_artist()) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

/// Number of neighbouring pairs sharing a primary artist
pub fn artist_repeats(tracks: &[Track]) -> usize {
    tracks
        .windows(2)
        .filter(|pair| same_primary_artist(&pair[0], &pair[1]))
        .count()
}
