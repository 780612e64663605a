use std::fmt;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, error, warn};
use ureq::Agent;
use urlencoding::encode;

use crate::auth::TokenProvider;
use crate::config::Config;
use crate::error::ApiError;
use crate::models::{
    AudioFeatures, AudioFeaturesResponse, CurrentUser, PlaylistInfo, PlaylistPage,
    SearchResponse, SnapshotResponse, Track,
};

/// Attempts per logical request before giving up
pub const MAX_ATTEMPTS: u32 = 5;
/// Used when a 429 arrives without a usable `Retry-After` header
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 5;
/// Longest rate-limit wait honoured from a `Retry-After` header
pub const MAX_RETRY_AFTER_SECS: u64 = 300;
const AUTH_RETRY_DELAY: Duration = Duration::from_secs(1);
const TRANSIENT_RETRY_DELAY: Duration = Duration::from_secs(2);
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a single HTTP attempt produced, before any retry decision
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Response {
        status: u16,
        retry_after: Option<u64>,
        body: String,
    },
    /// Timeouts, refused connections, broken bodies
    Transport(String),
}

/// Why an attempt is being retried. These never leave the client.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryReason {
    RateLimited { retry_after: u64 },
    AuthExpired,
    ServerError(u16),
    Network(String),
}

impl fmt::Display for RetryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryReason::RateLimited { retry_after } => {
                write!(f, "rate limited (Retry-After {retry_after}s)")
            }
            RetryReason::AuthExpired => f.write_str("access token expired"),
            RetryReason::ServerError(status) => write!(f, "server error HTTP {status}"),
            RetryReason::Network(message) => write!(f, "network error: {message}"),
        }
    }
}

#[derive(Debug)]
pub enum Fatal {
    Rejected { status: u16, message: String },
    Malformed(serde_json::Error),
}

#[derive(Debug)]
pub enum Decision {
    Done(Option<Value>),
    Retry { delay: Duration, reason: RetryReason },
    Fatal(Fatal),
}

/// Decide what to do with the outcome of one attempt.
///
/// Transport failures and protocol statuses go through the same table:
///
/// | outcome            | decision                          |
/// |--------------------|-----------------------------------|
/// | transport error    | retry after 2s                    |
/// | 429                | retry after `Retry-After` + 1s,   |
/// |                    | waiting at most 300s + 1s         |
/// | 401                | retry after 1s                    |
/// | >= 500             | retry after 2s                    |
/// | other 4xx          | fatal                             |
/// | 204 / empty body   | done, no payload                  |
/// | anything else      | done with the parsed JSON payload |
pub fn classify(outcome: Outcome) -> Decision {
    let (status, retry_after, body) = match outcome {
        Outcome::Transport(message) => {
            return Decision::Retry {
                delay: TRANSIENT_RETRY_DELAY,
                reason: RetryReason::Network(message),
            };
        }
        Outcome::Response {
            status,
            retry_after,
            body,
        } => (status, retry_after, body),
    };

    match status {
        429 => {
            let wait = retry_after
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
                .min(MAX_RETRY_AFTER_SECS);
            Decision::Retry {
                delay: Duration::from_secs(wait.saturating_add(1)),
                reason: RetryReason::RateLimited { retry_after: wait },
            }
        }
        401 => Decision::Retry {
            delay: AUTH_RETRY_DELAY,
            reason: RetryReason::AuthExpired,
        },
        s if s >= 500 => Decision::Retry {
            delay: TRANSIENT_RETRY_DELAY,
            reason: RetryReason::ServerError(s),
        },
        s if s >= 400 => Decision::Fatal(Fatal::Rejected {
            status: s,
            message: error_message(&body),
        }),
        204 => Decision::Done(None),
        _ if body.trim().is_empty() => Decision::Done(None),
        _ => match serde_json::from_str(&body) {
            Ok(value) => Decision::Done(Some(value)),
            Err(e) => Decision::Fatal(Fatal::Malformed(e)),
        },
    }
}

/// Pull the human-readable message out of a Spotify error body
fn error_message(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let message = parsed.as_ref().and_then(|v| {
        v.pointer("/error/message")
            .or_else(|| v.get("error_description"))
            .or_else(|| v.get("error"))
            .and_then(Value::as_str)
            .map(str::to_string)
    });

    match message {
        Some(m) => m,
        None => body.trim().chars().take(200).collect(),
    }
}

/// One HTTP round trip. Implementations never retry.
pub trait Transport {
    fn send(&self, method: Method, url: &str, token: &str, body: Option<&str>) -> Outcome;
}

/// Blocking transport backed by a shared `ureq` agent
pub struct UreqTransport {
    agent: Agent,
}

impl UreqTransport {
    pub fn new() -> Self {
        let agent = ureq::AgentBuilder::new().timeout(HTTP_TIMEOUT).build();
        UreqTransport { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for UreqTransport {
    fn send(&self, method: Method, url: &str, token: &str, body: Option<&str>) -> Outcome {
        let request = self
            .agent
            .request(method.as_str(), url)
            .set("Authorization", &format!("Bearer {token}"));

        let result = match body {
            Some(json) => request
                .set("Content-Type", "application/json")
                .send_string(json),
            None => request.call(),
        };

        match result {
            Ok(response) | Err(ureq::Error::Status(_, response)) => response_outcome(response),
            Err(ureq::Error::Transport(e)) => Outcome::Transport(e.to_string()),
        }
    }
}

fn response_outcome(response: ureq::Response) -> Outcome {
    let status = response.status();
    let retry_after = response
        .header("Retry-After")
        .and_then(|v| v.trim().parse::<u64>().ok());

    match response.into_string() {
        Ok(body) => Outcome::Response {
            status,
            retry_after,
            body,
        },
        Err(e) => Outcome::Transport(format!("failed to read response body: {e}")),
    }
}

/// Blocking wait between attempts
#[cfg_attr(test, mockall::automock)]
pub trait Backoff {
    fn pause(&self, delay: Duration);
}

pub struct ThreadSleep;

impl Backoff for ThreadSleep {
    fn pause(&self, delay: Duration) {
        std::thread::sleep(delay);
    }
}

/// Spotify Web API client with a uniform bounded-retry policy
pub struct SpotifyClient {
    transport: Box<dyn Transport>,
    tokens: Box<dyn TokenProvider>,
    backoff: Box<dyn Backoff>,
    base_url: String,
}

impl SpotifyClient {
    /// Create a client that talks to the configured API over HTTP
    pub fn new(config: &Config, tokens: Box<dyn TokenProvider>) -> Self {
        Self::with_parts(
            &config.api_base_url,
            Box::new(UreqTransport::new()),
            tokens,
            Box::new(ThreadSleep),
        )
    }

    pub fn with_parts(
        base_url: &str,
        transport: Box<dyn Transport>,
        tokens: Box<dyn TokenProvider>,
        backoff: Box<dyn Backoff>,
    ) -> Self {
        SpotifyClient {
            transport,
            tokens,
            backoff,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Issue a request, retrying transient failures up to [`MAX_ATTEMPTS`] times.
    ///
    /// Returns `Ok(None)` for 204 and empty bodies. Rate limits, expired
    /// tokens, server errors and network errors are absorbed here; callers
    /// only ever see client rejections, exhaustion, or decode failures.
    pub fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Option<Value>, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let payload = body.map(Value::to_string);

        for attempt in 1..=MAX_ATTEMPTS {
            let token = self.tokens.get_token()?;
            debug!(%method, path, attempt, "sending Spotify request");
            let outcome = self
                .transport
                .send(method, &url, &token, payload.as_deref());

            match classify(outcome) {
                Decision::Done(value) => return Ok(value),
                Decision::Fatal(Fatal::Rejected { status, message }) => {
                    return Err(ApiError::Client {
                        method,
                        path: path.to_string(),
                        status,
                        message,
                    });
                }
                Decision::Fatal(Fatal::Malformed(source)) => {
                    return Err(ApiError::Decode {
                        method,
                        path: path.to_string(),
                        source,
                    });
                }
                Decision::Retry { delay, reason } => {
                    warn!(
                        %method,
                        path,
                        attempt,
                        delay_secs = delay.as_secs(),
                        "Spotify request failed: {reason}"
                    );
                    if attempt < MAX_ATTEMPTS {
                        self.backoff.pause(delay);
                    }
                }
            }
        }

        error!(%method, path, attempts = MAX_ATTEMPTS, "giving up on Spotify request");
        Err(ApiError::ExhaustedRetries {
            method,
            path: path.to_string(),
            attempts: MAX_ATTEMPTS,
        })
    }

    pub fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.call(Method::Get, path, None)
    }

    pub fn post<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T, ApiError> {
        self.call(Method::Post, path, Some(body))
    }

    fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<T, ApiError> {
        let value = self
            .request(method, path, body)?
            .ok_or_else(|| ApiError::MissingBody {
                method,
                path: path.to_string(),
            })?;

        serde_json::from_value(value).map_err(|source| ApiError::Decode {
            method,
            path: path.to_string(),
            source,
        })
    }

    /// The account the access token belongs to
    pub fn current_user(&self) -> Result<CurrentUser, ApiError> {
        self.get("/me")
    }

    /// One page of track search results. Null entries are dropped.
    pub fn search_tracks(
        &self,
        query: &str,
        market: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Track>, ApiError> {
        let path = format!(
            "/search?q={}&type=track&market={}&limit={}&offset={}",
            encode(query),
            encode(market),
            limit,
            offset
        );
        let response: SearchResponse = self.get(&path)?;

        Ok(response
            .tracks
            .map(|page| page.items.into_iter().flatten().collect())
            .unwrap_or_default())
    }

    /// Audio features for up to 100 track ids, positionally aligned with `ids`
    pub fn audio_features(&self, ids: &[String]) -> Result<Vec<Option<AudioFeatures>>, ApiError> {
        let path = format!("/audio-features?ids={}", encode(&ids.join(",")));
        let response: AudioFeaturesResponse = self.get(&path)?;
        Ok(response.audio_features)
    }

    pub fn playlists_page(&self, limit: u32, offset: u32) -> Result<PlaylistPage, ApiError> {
        self.get(&format!("/me/playlists?limit={limit}&offset={offset}"))
    }

    pub fn create_playlist(
        &self,
        user_id: &str,
        name: &str,
        description: &str,
    ) -> Result<PlaylistInfo, ApiError> {
        let body = json!({
            "name": name,
            "public": false,
            "description": description,
        });
        self.post(&format!("/users/{}/playlists", encode(user_id)), &body)
    }

    /// Replace every item of a playlist with `uris`, in order
    pub fn replace_playlist_tracks(
        &self,
        playlist_id: &str,
        uris: &[String],
    ) -> Result<Option<String>, ApiError> {
        let body = json!({ "uris": uris });
        let path = format!("/playlists/{}/tracks", encode(playlist_id));
        let snapshot = self
            .request(Method::Put, &path, Some(&body))?
            .and_then(|v| serde_json::from_value::<SnapshotResponse>(v).ok())
            .map(|s| s.snapshot_id);
        Ok(snapshot)
    }
}
