use thiserror::Error;

use crate::client::Method;

/// Errors surfaced by the Spotify client once its retry policy gives up
#[derive(Error, Debug)]
pub enum ApiError {
    /// A 4xx response other than 401/429; never retried
    #[error("{method} {path} was rejected with HTTP {status}: {message}")]
    Client {
        method: Method,
        path: String,
        status: u16,
        message: String,
    },

    #[error("{method} {path} failed after {attempts} attempts")]
    ExhaustedRetries {
        method: Method,
        path: String,
        attempts: u32,
    },

    #[error("could not decode response from {method} {path}: {source}")]
    Decode {
        method: Method,
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{method} {path} returned no content where a body was expected")]
    MissingBody { method: Method, path: String },

    #[error("could not obtain an access token: {0}")]
    Auth(#[from] AuthError),
}

impl ApiError {
    /// HTTP status for client rejections, `None` for every other kind
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Client { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_forbidden(&self) -> bool {
        self.status() == Some(403)
    }
}

/// Errors from the token provider
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("token cache {path} is unreadable: {source}")]
    CacheRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("token cache {path} is malformed: {source}")]
    CacheFormat {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("token refresh failed: {0}")]
    Refresh(String),
}

/// Errors reading or writing the selection history file
#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("history file {path} could not be read: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("history file {path} is not valid JSON: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("history file {path} could not be written: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Fatal outcomes of a playlist run, each mapped to its own exit status
#[derive(Error, Debug)]
pub enum RunError {
    #[error("cannot authenticate with Spotify: {0}")]
    Authentication(#[source] ApiError),

    #[error(
        "no candidates left to choose from (gathered {gathered}, {filtered} after filtering, {excluded} recently used)"
    )]
    EmptyCandidatePool {
        gathered: usize,
        filtered: usize,
        excluded: usize,
    },

    #[error("failed to update playlist '{playlist}': {source}")]
    SyncFailure {
        playlist: String,
        #[source]
        source: ApiError,
    },

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    History(#[from] HistoryError),
}

impl RunError {
    pub const EXIT_AUTHENTICATION: i32 = 1;
    pub const EXIT_EMPTY_POOL: i32 = 2;
    pub const EXIT_SYNC_FAILURE: i32 = 3;
    pub const EXIT_OTHER: i32 = 4;

    pub fn exit_code(&self) -> i32 {
        match self {
            RunError::Authentication(_) | RunError::Api(ApiError::Auth(_)) => {
                Self::EXIT_AUTHENTICATION
            }
            RunError::EmptyCandidatePool { .. } => Self::EXIT_EMPTY_POOL,
            RunError::SyncFailure { .. } => Self::EXIT_SYNC_FAILURE,
            RunError::Api(_) | RunError::History(_) => Self::EXIT_OTHER,
        }
    }
}
