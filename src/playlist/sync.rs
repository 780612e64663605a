use tracing::info;

use crate::client::SpotifyClient;
use crate::error::ApiError;

/// Playlists requested per page while looking for the target by name
pub const PLAYLIST_PAGE_SIZE: u32 = 50;

/// Finds or creates the target playlist and overwrites its contents
pub struct PlaylistSync<'a> {
    client: &'a SpotifyClient,
    user_id: &'a str,
    description: &'a str,
}

impl<'a> PlaylistSync<'a> {
    pub fn new(client: &'a SpotifyClient, user_id: &'a str, description: &'a str) -> Self {
        Self {
            client,
            user_id,
            description,
        }
    }

    /// Id of the first playlist named exactly `name`, creating a private one
    /// if none exists
    pub fn ensure_playlist(&self, name: &str) -> Result<String, ApiError> {
        if let Some(id) = self.find_playlist(name)? {
            return Ok(id);
        }

        info!(playlist = name, "creating new playlist");
        let created = self
            .client
            .create_playlist(self.user_id, name, self.description)?;
        Ok(created.id)
    }

    /// Walk the account's playlists page by page; first exact name match wins
    pub fn find_playlist(&self, name: &str) -> Result<Option<String>, ApiError> {
        let mut offset = 0;

        loop {
            let page = self.client.playlists_page(PLAYLIST_PAGE_SIZE, offset)?;
            if let Some(existing) = page.items.iter().flatten().find(|p| p.name == name) {
                info!(
                    playlist = name,
                    id = %existing.id,
                    public = ?existing.public,
                    "found existing playlist"
                );
                return Ok(Some(existing.id.clone()));
            }
            if page.next.is_none() || page.items.is_empty() {
                return Ok(None);
            }
            offset += PLAYLIST_PAGE_SIZE;
        }
    }

    /// Replace the playlist's whole track list with `uris`. Running it again
    /// with the same input leaves the playlist unchanged.
    pub fn replace_contents(&self, playlist_id: &str, uris: &[String]) -> Result<(), ApiError> {
        let snapshot = self.client.replace_playlist_tracks(playlist_id, uris)?;
        info!(
            playlist_id,
            tracks = uris.len(),
            snapshot = snapshot.as_deref().unwrap_or("-"),
            "replaced playlist contents"
        );
        Ok(())
    }
}
