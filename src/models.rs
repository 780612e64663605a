use serde::{Deserialize, Serialize};

/// A catalog track as returned by search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub uri: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
    #[serde(default)]
    pub popularity: u8,
}

/// Simplified artist object embedded in a track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtistRef {
    pub id: Option<String>, // null for local files
    #[serde(default)]
    pub name: String,
}

impl Track {
    /// Identifier of the first credited artist
    pub fn primary_artist(&self) -> Option<&str> {
        self.artists.first().and_then(|a| a.id.as_deref())
    }

    /// Human-readable "name by artists" label for logs
    pub fn label(&self) -> String {
        let artists: Vec<&str> = self.artists.iter().map(|a| a.name.as_str()).collect();
        format!("\"{}\" by {}", self.name, artists.join(", "))
    }
}

/// Tempo and energy descriptors for one track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioFeatures {
    pub id: String,
    pub tempo: f64,
    pub energy: f64,
}

/// Response structure for GET /audio-features
#[derive(Debug, Deserialize)]
pub struct AudioFeaturesResponse {
    #[serde(default)]
    pub audio_features: Vec<Option<AudioFeatures>>,
}

/// Response structure for GET /search
#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    pub tracks: Option<TrackPage>,
}

#[derive(Debug, Deserialize)]
pub struct TrackPage {
    #[serde(default)]
    pub items: Vec<Option<Track>>,
}

/// Response structure for GET /me
#[derive(Debug, Clone, Deserialize)]
pub struct CurrentUser {
    pub id: String,
    pub display_name: Option<String>,
}

/// Response structure for GET /me/playlists
#[derive(Debug, Deserialize)]
pub struct PlaylistPage {
    #[serde(default)]
    pub items: Vec<Option<PlaylistInfo>>,
    pub next: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlaylistInfo {
    pub id: String,
    pub name: String,
    pub public: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct SnapshotResponse {
    pub snapshot_id: String,
}
