use chrono::NaiveDate;
use rand::Rng;
use tracing::{debug, info, warn};

use super::filters::{CandidateFilter, FilterMode};
use super::gather::CandidateGatherer;
use super::selector::{Selector, artist_repeats};
use super::sync::PlaylistSync;
use super::CurationConfig;
use crate::client::SpotifyClient;
use crate::error::{ApiError, RunError};
use crate::history::HistoryStore;
use crate::models::Track;

/// What a completed run did
#[derive(Debug)]
pub struct RunReport {
    /// `None` only on a dry run when the playlist does not exist yet
    pub playlist_id: Option<String>,
    pub selected: Vec<Track>,
    pub filter_mode: FilterMode,
    pub dry_run: bool,
}

/// Main playlist generator: one refresh of the morning playlist
pub struct PlaylistGenerator<'a> {
    client: &'a SpotifyClient,
    config: &'a CurationConfig,
    history: &'a HistoryStore,
}

impl<'a> PlaylistGenerator<'a> {
    pub fn new(
        client: &'a SpotifyClient,
        config: &'a CurationConfig,
        history: &'a HistoryStore,
    ) -> Self {
        Self {
            client,
            config,
            history,
        }
    }

    /// Gather, filter, exclude recent picks, select, then publish and record.
    ///
    /// A dry run stops after selection: nothing is created, replaced or saved.
    pub fn run<R: Rng + ?Sized>(
        &self,
        today: NaiveDate,
        dry_run: bool,
        rng: &mut R,
    ) -> Result<RunReport, RunError> {
        let user = self
            .client
            .current_user()
            .map_err(RunError::Authentication)?;
        info!(
            user = %user.id,
            name = user.display_name.as_deref().unwrap_or("-"),
            "authenticated with Spotify"
        );

        let playlist_name = &self.config.playlist_name;
        let sync = PlaylistSync::new(self.client, &user.id, &self.config.description);
        let sync_failure = |source: ApiError| RunError::SyncFailure {
            playlist: playlist_name.clone(),
            source,
        };
        let playlist_id = if dry_run {
            sync.find_playlist(playlist_name).map_err(sync_failure)?
        } else {
            Some(sync.ensure_playlist(playlist_name).map_err(sync_failure)?)
        };

        let gathered = CandidateGatherer::new(self.client, self.config).gather()?;
        let gathered_count = gathered.len();

        let filtered = CandidateFilter::new(self.client, self.config.thresholds).filter(gathered)?;
        let filtered_count = filtered.tracks.len();
        if filtered.mode == FilterMode::PopularityOnly {
            warn!("tempo and energy were not checked for this run");
        }

        let history = HistoryStore::prune(self.history.load()?, self.config.days_history, today);
        if history.is_empty() {
            debug!("no recent history to exclude");
        } else if history.get(today).is_some() {
            info!("already ran today; today's earlier picks will be replaced");
        }
        let recent = HistoryStore::excluded_ids(&history);
        let candidates: Vec<Track> = filtered
            .tracks
            .into_iter()
            .filter(|t| !recent.contains(&t.id))
            .collect();
        info!(
            recent = recent.len(),
            remaining = candidates.len(),
            "excluded recently used tracks"
        );

        if candidates.is_empty() {
            return Err(RunError::EmptyCandidatePool {
                gathered: gathered_count,
                filtered: filtered_count,
                excluded: filtered_count - candidates.len(),
            });
        }

        let selected = Selector::select(&candidates, self.config.selection, rng);
        info!(
            tracks = selected.len(),
            pool = candidates.len(),
            artist_repeats = artist_repeats(&selected),
            "selected tracks"
        );
        for (i, track) in selected.iter().enumerate() {
            if dry_run {
                info!("{:>3}. {} [{}]", i + 1, track.label(), track.uri);
            } else {
                debug!("{:>3}. {} [{}]", i + 1, track.label(), track.uri);
            }
        }

        let publish_to = if dry_run { None } else { playlist_id.clone() };
        let report = RunReport {
            playlist_id,
            selected,
            filter_mode: filtered.mode,
            dry_run,
        };

        let Some(playlist_id) = publish_to else {
            info!(playlist = %playlist_name, "dry run: playlist and history left untouched");
            return Ok(report);
        };
        let uris: Vec<String> = report.selected.iter().map(|t| t.uri.clone()).collect();
        info!(playlist = %playlist_name, tracks = uris.len(), "updating playlist");
        sync.replace_contents(&playlist_id, &uris).map_err(sync_failure)?;

        let ids = report.selected.iter().map(|t| t.id.clone()).collect();
        let history = HistoryStore::record_selection(history, today, ids);
        self.history.save(&history)?;
        info!(path = %self.history.path().display(), days = history.len(), "saved history");

        Ok(report)
    }
}
