use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Local;
use clap::Parser;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry, fmt};

mod auth;
mod client;
mod config;
mod error;
mod history;
mod models;
mod playlist;

#[cfg(test)]
mod testing;

use crate::auth::{CachedTokenProvider, StaticToken, TokenProvider};
use crate::client::SpotifyClient;
use crate::config::load_config;
use crate::error::RunError;
use crate::history::HistoryStore;
use crate::playlist::filters::FilterMode;
use crate::playlist::{CurationConfig, PlaylistGenerator, SelectionBounds};

#[derive(Parser)]
#[command(name = "morning-playlist")]
#[command(about = "Refresh a daily Spotify playlist of quiet, lesser-known tracks")]
#[command(version)]
struct Args {
    /// Name of the playlist to create or overwrite
    #[arg(long, env = "PLAYLIST_NAME", default_value = "MTB Daily Morning")]
    playlist_name: String,

    /// JSON file recording which tracks were used on which day
    #[arg(long, env = "HISTORY_FILE", default_value = "history.json")]
    history_file: PathBuf,

    /// Days of history whose tracks are not picked again
    #[arg(long, env = "DAYS_HISTORY", default_value_t = 3)]
    days_history: u32,

    #[arg(long, env = "MIN_TRACKS", default_value_t = 20)]
    min_tracks: usize,

    #[arg(long, env = "MAX_TRACKS", default_value_t = 40)]
    max_tracks: usize,

    /// Genre to search; repeat for several. Defaults to indie, chill and dream pop.
    #[arg(long = "genre", value_name = "GENRE")]
    genres: Vec<String>,

    /// Market (ISO country code) used for search
    #[arg(long, env = "MARKET", default_value = "JP")]
    market: String,

    /// Log file, appended to on every run
    #[arg(long, env = "LOG_FILE", default_value = "morning_playlist_update.log")]
    log_file: PathBuf,

    /// Seed the random selection for a reproducible playlist
    #[arg(long)]
    seed: Option<u64>,

    /// Print the selection without touching the playlist or the history file
    #[arg(long)]
    dry_run: bool,
}

impl Args {
    fn curation_config(&self) -> CurationConfig {
        let defaults = CurationConfig::default();
        CurationConfig {
            playlist_name: self.playlist_name.clone(),
            genres: if self.genres.is_empty() {
                defaults.genres.clone()
            } else {
                self.genres.clone()
            },
            market: self.market.clone(),
            selection: SelectionBounds {
                min_tracks: self.min_tracks,
                max_tracks: self.max_tracks,
            },
            days_history: self.days_history,
            ..defaults
        }
    }
}

/// Console output plus an append-only log file. A log file that cannot be
/// opened only loses the file copy.
fn build_subscriber(log_file: &Path) -> impl tracing::Subscriber + Send + Sync {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = match OpenOptions::new().create(true).append(true).open(log_file) {
        Ok(file) => Some(
            fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(false),
        ),
        Err(e) => {
            eprintln!("Warning: cannot open log file '{}': {e}", log_file.display());
            None
        }
    };

    Registry::default()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
}

fn run(args: &Args) -> i32 {
    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            error!("configuration error: {e:#}");
            return RunError::EXIT_AUTHENTICATION;
        }
    };

    let curation = args.curation_config();
    if let Err(e) = curation.validate() {
        error!("invalid settings: {e:#}");
        return RunError::EXIT_OTHER;
    }

    let tokens: Box<dyn TokenProvider> = match &config.access_token {
        Some(token) => Box::new(StaticToken(token.clone())),
        None => match CachedTokenProvider::load(&config) {
            Ok(provider) => Box::new(provider),
            Err(e) => {
                error!("cannot load Spotify credentials: {e}");
                return RunError::EXIT_AUTHENTICATION;
            }
        },
    };

    let client = SpotifyClient::new(&config, tokens);
    let history = HistoryStore::new(args.history_file.clone());
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let today = Local::now().date_naive();

    info!(
        playlist = %curation.playlist_name,
        date = %today,
        dry_run = args.dry_run,
        "starting morning playlist update"
    );

    match PlaylistGenerator::new(&client, &curation, &history).run(today, args.dry_run, &mut rng) {
        Ok(report) => {
            let popularity_only = report.filter_mode == FilterMode::PopularityOnly;
            match (&report.playlist_id, report.dry_run) {
                (Some(id), false) => info!(
                    playlist_id = %id,
                    tracks = report.selected.len(),
                    popularity_only,
                    "playlist updated"
                ),
                _ => info!(
                    tracks = report.selected.len(),
                    popularity_only,
                    "dry run complete"
                ),
            }
            0
        }
        Err(e) => {
            error!("playlist update failed: {e}");
            e.exit_code()
        }
    }
}

/// `.env` supplies the env-backed flags as well as the credentials, so it
/// is loaded before the command line is read
fn parse_args() -> Args {
    dotenv::dotenv().ok();
    Args::parse()
}

fn main() {
    let args = parse_args();
    let subscriber = build_subscriber(&args.log_file);

    let code = tracing::subscriber::with_default(subscriber, || run(&args));

    std::process::exit(code);
}
