use std::cell::RefCell;
use std::io::Write;
use std::path::{Path, PathBuf};

use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{info, warn};
use ureq::{Agent, AgentBuilder};

use crate::client::HTTP_TIMEOUT;
use crate::config::Config;
use crate::error::AuthError;

/// Refresh this many seconds before the cached expiry
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Source of bearer tokens. Implementations refresh on their own;
/// callers simply ask again after a 401.
#[cfg_attr(test, mockall::automock)]
pub trait TokenProvider {
    fn get_token(&self) -> Result<String, AuthError>;
}

/// A fixed token, e.g. from `SPOTIFY_ACCESS_TOKEN`
pub struct StaticToken(pub String);

impl TokenProvider for StaticToken {
    fn get_token(&self) -> Result<String, AuthError> {
        Ok(self.0.clone())
    }
}

/// Token cache file layout, compatible with the usual `.cache` written by
/// Spotify OAuth helpers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedToken {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
    /// Unix seconds
    pub expires_at: i64,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    token_type: Option<String>,
    expires_in: i64,
    scope: Option<String>,
    refresh_token: Option<String>,
}

impl CachedToken {
    pub fn needs_refresh(&self, now: i64) -> bool {
        now + EXPIRY_MARGIN_SECS >= self.expires_at
    }

    fn refreshed(&self, response: RefreshResponse, now: i64) -> CachedToken {
        CachedToken {
            access_token: response.access_token,
            token_type: response.token_type.or_else(|| self.token_type.clone()),
            expires_in: Some(response.expires_in),
            scope: response.scope.or_else(|| self.scope.clone()),
            expires_at: now + response.expires_in,
            // Spotify only sometimes rotates the refresh token
            refresh_token: response.refresh_token.or_else(|| self.refresh_token.clone()),
        }
    }
}

/// Token provider backed by a cache file, refreshing through the accounts
/// service when the access token is about to expire
pub struct CachedTokenProvider {
    cache_path: PathBuf,
    token_url: String,
    client_id: String,
    client_secret: String,
    agent: Agent,
    token: RefCell<CachedToken>,
}

impl CachedTokenProvider {
    pub fn load(config: &Config) -> Result<Self, AuthError> {
        let token = read_cache(&config.token_cache)?;
        Ok(CachedTokenProvider {
            cache_path: config.token_cache.clone(),
            token_url: config.token_url.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            agent: AgentBuilder::new().timeout(HTTP_TIMEOUT).build(),
            token: RefCell::new(token),
        })
    }

    fn request_refresh(&self, refresh_token: &str) -> Result<RefreshResponse, AuthError> {
        let credentials = STANDARD.encode(format!("{}:{}", self.client_id, self.client_secret));
        let result = self
            .agent
            .post(&self.token_url)
            .set("Authorization", &format!("Basic {credentials}"))
            .send_form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ]);

        match result {
            Ok(response) => response
                .into_json::<RefreshResponse>()
                .map_err(|e| AuthError::Refresh(format!("unreadable token response: {e}"))),
            Err(ureq::Error::Status(code, response)) => {
                let body = response.into_string().unwrap_or_default();
                Err(AuthError::Refresh(format!("HTTP {code}: {body}")))
            }
            Err(ureq::Error::Transport(e)) => Err(AuthError::Refresh(e.to_string())),
        }
    }

    /// Replace the cache file in one rename so a crash never leaves it half written
    fn persist(&self, token: &CachedToken) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(token)?;
        let dir = match self.cache_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut file = NamedTempFile::new_in(dir)?;
        file.write_all(json.as_bytes())?;
        file.flush()?;
        file.persist(&self.cache_path).map_err(|e| e.error)?;
        Ok(())
    }
}

impl TokenProvider for CachedTokenProvider {
    fn get_token(&self) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let mut token = self.token.borrow_mut();

        if token.needs_refresh(now) {
            let refresh_token = token.refresh_token.clone().ok_or_else(|| {
                AuthError::Refresh("access token expired and no refresh token is cached".into())
            })?;
            let response = self.request_refresh(&refresh_token)?;
            *token = token.refreshed(response, now);
            info!(expires_at = token.expires_at, "refreshed Spotify access token");

            if let Err(e) = self.persist(&token) {
                warn!(path = %self.cache_path.display(), "could not update token cache: {e}");
            }
        }

        Ok(token.access_token.clone())
    }
}

fn read_cache(path: &Path) -> Result<CachedToken, AuthError> {
    let content = std::fs::read_to_string(path).map_err(|source| AuthError::CacheRead {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| AuthError::CacheFormat {
        path: path.display().to_string(),
        source,
    })
}
