use std::collections::HashMap;

use tracing::{info, warn};

use super::FilterThresholds;
use crate::client::SpotifyClient;
use crate::error::ApiError;
use crate::models::{AudioFeatures, Track};

/// Ids per audio-features request
pub const FEATURE_BATCH_SIZE: usize = 50;

/// Which filters were applied to a candidate pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    /// Popularity, tempo and energy
    Full,
    /// Audio features were forbidden; popularity only
    PopularityOnly,
}

#[derive(Debug)]
pub struct FilterOutcome {
    pub tracks: Vec<Track>,
    pub mode: FilterMode,
}

/// Track filtering predicates using static helper functions
pub struct TrackFilters;

impl TrackFilters {
    /// Check that a track is not more popular than allowed
    pub fn within_popularity(track: &Track, thresholds: &FilterThresholds) -> bool {
        track.popularity <= thresholds.max_popularity
    }

    /// Check tempo and energy. Tracks without features are rejected.
    pub fn within_audio_limits(
        features: Option<&AudioFeatures>,
        thresholds: &FilterThresholds,
    ) -> bool {
        let Some(features) = features else {
            return false;
        };

        features.tempo <= thresholds.max_tempo && features.energy <= thresholds.max_energy
    }

    /// Apply every filter to determine if a track should be kept
    pub fn should_include_track(
        track: &Track,
        features: Option<&AudioFeatures>,
        thresholds: &FilterThresholds,
    ) -> bool {
        Self::within_popularity(track, thresholds)
            && Self::within_audio_limits(features, thresholds)
    }
}

/// Narrows gathered candidates down to quiet, lesser-known tracks
pub struct CandidateFilter<'a> {
    client: &'a SpotifyClient,
    thresholds: FilterThresholds,
}

impl<'a> CandidateFilter<'a> {
    pub fn new(client: &'a SpotifyClient, thresholds: FilterThresholds) -> Self {
        Self { client, thresholds }
    }

    /// Keep the candidates that pass every threshold, in their original order.
    ///
    /// If any audio-features batch answers 403 the features fetched so far
    /// are discarded and the whole original pool is filtered by popularity
    /// alone. Partial feature coverage is never used.
    pub fn filter(&self, candidates: Vec<Track>) -> Result<FilterOutcome, ApiError> {
        if candidates.is_empty() {
            return Ok(FilterOutcome {
                tracks: candidates,
                mode: FilterMode::Full,
            });
        }

        let thresholds = self.thresholds;
        let total = candidates.len();

        let outcome = match self.fetch_features(&candidates) {
            Ok(features) => FilterOutcome {
                tracks: candidates
                    .into_iter()
                    .filter(|t| {
                        TrackFilters::should_include_track(t, features.get(&t.id), &thresholds)
                    })
                    .collect(),
                mode: FilterMode::Full,
            },
            Err(e) if e.is_forbidden() => {
                warn!("audio features are forbidden, falling back to popularity-only filtering: {e}");
                FilterOutcome {
                    tracks: candidates
                        .into_iter()
                        .filter(|t| TrackFilters::within_popularity(t, &thresholds))
                        .collect(),
                    mode: FilterMode::PopularityOnly,
                }
            }
            Err(e) => return Err(e),
        };

        info!(
            before = total,
            after = outcome.tracks.len(),
            mode = ?outcome.mode,
            "filtered candidates"
        );
        Ok(outcome)
    }

    fn fetch_features(&self, candidates: &[Track]) -> Result<HashMap<String, AudioFeatures>, ApiError> {
        let mut features = HashMap::with_capacity(candidates.len());

        for batch in candidates.chunks(FEATURE_BATCH_SIZE) {
            let ids: Vec<String> = batch.iter().map(|t| t.id.clone()).collect();
            for entry in self.client.audio_features(&ids)?.into_iter().flatten() {
                features.insert(entry.id.clone(), entry);
            }
        }

        Ok(features)
    }
}
