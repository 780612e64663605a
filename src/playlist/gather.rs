use std::collections::HashSet;

use tracing::{debug, info};

use super::CurationConfig;
use crate::client::SpotifyClient;
use crate::error::ApiError;
use crate::models::Track;

/// Collects candidate tracks by searching every configured genre page by page
pub struct CandidateGatherer<'a> {
    client: &'a SpotifyClient,
    config: &'a CurationConfig,
}

impl<'a> CandidateGatherer<'a> {
    pub fn new(client: &'a SpotifyClient, config: &'a CurationConfig) -> Self {
        Self { client, config }
    }

    pub fn search_query(genre: &str) -> String {
        format!("genre:\"{genre}\"")
    }

    /// One search per (genre, offset) pair, in order. Tracks already seen are
    /// skipped so the first occurrence keeps its position.
    pub fn gather(&self) -> Result<Vec<Track>, ApiError> {
        let mut candidates = Vec::new();
        let mut seen_ids = HashSet::new();
        let offsets = self.config.search.offsets();

        for genre in self.config.genres.iter().filter(|g| !g.trim().is_empty()) {
            let query = Self::search_query(genre);

            for &offset in &offsets {
                let page = self.client.search_tracks(
                    &query,
                    &self.config.market,
                    self.config.search.page_size,
                    offset,
                )?;

                let page_size = page.len();
                let before = candidates.len();
                for track in page {
                    if seen_ids.insert(track.id.clone()) {
                        candidates.push(track);
                    }
                }
                debug!(
                    genre = %genre,
                    offset,
                    returned = page_size,
                    new = candidates.len() - before,
                    "search page"
                );
            }
        }

        info!(count = candidates.len(), "gathered raw candidate tracks");
        Ok(candidates)
    }
}
