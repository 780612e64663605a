use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

/// Spotify rejects replace requests with more than this many URIs
pub const MAX_REPLACE_URIS: usize = 100;

/// Everything that shapes one day's playlist
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurationConfig {
    pub playlist_name: String,
    pub description: String,
    pub genres: Vec<String>, // searched as genre:"<name>"
    pub market: String,
    pub search: SearchSettings,
    pub thresholds: FilterThresholds,
    pub selection: SelectionBounds,
    pub days_history: u32,
}

/// Pagination for each genre search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    pub page_size: u32,
    pub pages: u32,
}

/// Upper limits a track must stay under to be picked
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FilterThresholds {
    pub max_popularity: u8,
    pub max_tempo: f64,  // beats per minute
    pub max_energy: f64, // 0.0 to 1.0
}

/// Inclusive range for the number of tracks in the playlist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionBounds {
    pub min_tracks: usize,
    pub max_tracks: usize,
}

impl SearchSettings {
    /// Offsets requested for every search term, in order
    pub fn offsets(&self) -> Vec<u32> {
        (0..self.pages).map(|page| page * self.page_size).collect()
    }
}

impl Default for CurationConfig {
    fn default() -> Self {
        Self {
            playlist_name: "MTB Daily Morning".to_string(),
            description: "Automated morning picks".to_string(),
            genres: vec![
                "indie pop".to_string(),
                "chill pop".to_string(),
                "dream pop".to_string(),
            ],
            market: "JP".to_string(),
            search: SearchSettings {
                page_size: 50,
                pages: 3,
            },
            thresholds: FilterThresholds {
                max_popularity: 60, // prefer less popular
                max_tempo: 120.0,
                max_energy: 0.6,
            },
            selection: SelectionBounds {
                min_tracks: 20,
                max_tracks: 40,
            },
            days_history: 3,
        }
    }
}

impl CurationConfig {
    /// Reject settings the pipeline cannot honour
    pub fn validate(&self) -> Result<()> {
        let SelectionBounds {
            min_tracks,
            max_tracks,
        } = self.selection;

        if self.playlist_name.trim().is_empty() {
            bail!("playlist name must not be empty");
        }
        if self.genres.iter().all(|g| g.trim().is_empty()) {
            bail!("at least one genre is required");
        }
        if min_tracks == 0 {
            bail!("min tracks must be at least 1");
        }
        if min_tracks > max_tracks {
            bail!("min tracks ({min_tracks}) is greater than max tracks ({max_tracks})");
        }
        if max_tracks > MAX_REPLACE_URIS {
            bail!("max tracks ({max_tracks}) exceeds the playlist replace limit of {MAX_REPLACE_URIS}");
        }
        if self.search.page_size == 0 || self.search.page_size > 50 {
            bail!("search page size must be between 1 and 50");
        }
        if self.search.pages == 0 {
            bail!("at least one search page is required");
        }
        Ok(())
    }
}
