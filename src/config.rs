use std::path::PathBuf;

use anyhow::{Context, Result};

pub const DEFAULT_API_BASE_URL: &str = "https://api.spotify.com/v1";
pub const DEFAULT_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
pub const DEFAULT_TOKEN_CACHE: &str = ".cache";

/// Credentials and endpoints loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub client_id: String,
    pub client_secret: String,
    pub token_cache: PathBuf,
    /// Bypasses the token cache when set
    pub access_token: Option<String>,
    pub api_base_url: String,
    pub token_url: String,
}

/// Load configuration from `.env` and environment
pub fn load_config() -> Result<Config> {
    // Load `.env` file if present
    dotenv::dotenv().ok();

    let client_id = std::env::var("CLIENT_ID").context("CLIENT_ID must be set")?;
    let client_secret = std::env::var("CLIENT_SECRET").context("CLIENT_SECRET must be set")?;
    let token_cache = std::env::var("TOKEN_CACHE").unwrap_or_else(|_| DEFAULT_TOKEN_CACHE.into());
    let access_token = std::env::var("SPOTIFY_ACCESS_TOKEN")
        .ok()
        .filter(|t| !t.trim().is_empty());
    let api_base_url =
        std::env::var("SPOTIFY_API_URL").unwrap_or_else(|_| DEFAULT_API_BASE_URL.into());
    let token_url =
        std::env::var("SPOTIFY_TOKEN_URL").unwrap_or_else(|_| DEFAULT_TOKEN_URL.into());

    Ok(Config {
        client_id,
        client_secret,
        token_cache: PathBuf::from(token_cache),
        access_token,
        api_base_url,
        token_url,
    })
}
