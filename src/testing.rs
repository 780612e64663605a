//! In-process stand-ins for the Spotify API used across the test modules.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::time::Duration;

use serde_json::{Value, json};

use crate::auth::StaticToken;
use crate::client::{Backoff, Method, Outcome, SpotifyClient, Transport};
use crate::models::{ArtistRef, AudioFeatures, PlaylistInfo, Track};

pub const BASE_URL: &str = "https://api.test/v1";

#[derive(Debug, Clone, PartialEq)]
pub struct SentRequest {
    pub method: Method,
    pub url: String,
    pub token: String,
    pub body: Option<String>,
}

pub type RequestLog = Rc<RefCell<Vec<SentRequest>>>;

/// Plays back a fixed list of outcomes, one per attempt
pub struct ScriptedTransport {
    outcomes: RefCell<VecDeque<Outcome>>,
    requests: RequestLog,
}

impl ScriptedTransport {
    pub fn new(outcomes: Vec<Outcome>) -> Self {
        ScriptedTransport {
            outcomes: RefCell::new(outcomes.into()),
            requests: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn requests(&self) -> RequestLog {
        Rc::clone(&self.requests)
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, method: Method, url: &str, token: &str, body: Option<&str>) -> Outcome {
        self.requests.borrow_mut().push(SentRequest {
            method,
            url: url.to_string(),
            token: token.to_string(),
            body: body.map(str::to_string),
        });
        self.outcomes
            .borrow_mut()
            .pop_front()
            .expect("scripted transport ran out of outcomes")
    }
}

pub struct NoWait;

impl Backoff for NoWait {
    fn pause(&self, _delay: Duration) {}
}

pub fn track(id: &str, artist: &str, popularity: u8) -> Track {
    Track {
        id: id.to_string(),
        uri: format!("spotify:track:{id}"),
        name: format!("Song {id}"),
        artists: vec![ArtistRef {
            id: Some(artist.to_string()),
            name: format!("Artist {artist}"),
        }],
        popularity,
    }
}

pub fn features(id: &str, tempo: f64, energy: f64) -> AudioFeatures {
    AudioFeatures {
        id: id.to_string(),
        tempo,
        energy,
    }
}

#[derive(Default)]
pub struct FakeState {
    pub user_id: String,
    pub search_results: HashMap<(String, u32), Vec<Track>>,
    pub features: HashMap<String, AudioFeatures>,
    /// Audio-feature batches (1-based) that answer 403
    pub forbidden_feature_batches: Vec<usize>,
    /// Status returned by every audio-feature call instead of data
    pub feature_failure: Option<u16>,
    pub feature_batches_served: usize,
    pub playlists: Vec<PlaylistInfo>,
    pub playlist_tracks: HashMap<String, Vec<String>>,
    pub replace_failure: Option<u16>,
    pub me_failure: Option<u16>,
    pub requests: Vec<SentRequest>,
}

/// Small stateful model of the endpoints the pipeline uses
#[derive(Clone, Default)]
pub struct FakeSpotify {
    pub state: Rc<RefCell<FakeState>>,
}

impl FakeSpotify {
    pub fn new(user_id: &str) -> Self {
        let fake = FakeSpotify::default();
        fake.state.borrow_mut().user_id = user_id.to_string();
        fake
    }

    pub fn client(&self) -> SpotifyClient {
        SpotifyClient::with_parts(
            BASE_URL,
            Box::new(self.clone()),
            Box::new(StaticToken("test-token".to_string())),
            Box::new(NoWait),
        )
    }

    pub fn with_search(self, query: &str, offset: u32, tracks: Vec<Track>) -> Self {
        self.state
            .borrow_mut()
            .search_results
            .insert((query.to_string(), offset), tracks);
        self
    }

    pub fn with_features(self, list: Vec<AudioFeatures>) -> Self {
        {
            let mut state = self.state.borrow_mut();
            for f in list {
                state.features.insert(f.id.clone(), f);
            }
        }
        self
    }

    pub fn with_playlists(self, names: &[&str]) -> Self {
        {
            let mut state = self.state.borrow_mut();
            for (i, name) in names.iter().enumerate() {
                state.playlists.push(PlaylistInfo {
                    id: format!("existing{i}"),
                    name: name.to_string(),
                    public: Some(true),
                });
            }
        }
        self
    }

    pub fn requests_to(&self, path_prefix: &str) -> Vec<SentRequest> {
        let prefix = format!("{BASE_URL}{path_prefix}");
        self.state
            .borrow()
            .requests
            .iter()
            .filter(|r| r.url.starts_with(&prefix))
            .cloned()
            .collect()
    }

    pub fn tracks_of(&self, playlist_id: &str) -> Option<Vec<String>> {
        self.state.borrow().playlist_tracks.get(playlist_id).cloned()
    }

    fn route(&self, method: Method, path: &str, query: &HashMap<String, String>, body: Option<&str>) -> Outcome {
        let mut state = self.state.borrow_mut();
        let param = |name: &str| query.get(name).cloned().unwrap_or_default();
        let number = |name: &str| param(name).parse::<u32>().unwrap_or(0);

        match (method, path) {
            (Method::Get, "/me") => match state.me_failure {
                Some(status) => error(status, "me unavailable"),
                None => ok(200, json!({ "id": state.user_id, "display_name": "Tester" })),
            },
            (Method::Get, "/search") => {
                let items = state
                    .search_results
                    .get(&(param("q"), number("offset")))
                    .cloned()
                    .unwrap_or_default();
                ok(200, json!({ "tracks": { "items": items } }))
            }
            (Method::Get, "/audio-features") => {
                state.feature_batches_served += 1;
                let batch = state.feature_batches_served;
                if state.forbidden_feature_batches.contains(&batch) {
                    return error(403, "Forbidden");
                }
                if let Some(status) = state.feature_failure {
                    return error(status, "features unavailable");
                }
                let list: Vec<Value> = param("ids")
                    .split(',')
                    .filter(|id| !id.is_empty())
                    .map(|id| match state.features.get(id) {
                        Some(f) => json!(f),
                        None => Value::Null,
                    })
                    .collect();
                ok(200, json!({ "audio_features": list }))
            }
            (Method::Get, "/me/playlists") => {
                let limit = number("limit") as usize;
                let offset = number("offset") as usize;
                let items: Vec<&PlaylistInfo> =
                    state.playlists.iter().skip(offset).take(limit).collect();
                let next = if offset + limit < state.playlists.len() {
                    Value::String(format!(
                        "{BASE_URL}/me/playlists?limit={limit}&offset={}",
                        offset + limit
                    ))
                } else {
                    Value::Null
                };
                let items: Vec<Value> = items
                    .iter()
                    .map(|p| json!({ "id": p.id, "name": p.name, "public": p.public }))
                    .collect();
                ok(200, json!({ "items": items, "next": next }))
            }
            (Method::Post, p) if p.starts_with("/users/") && p.ends_with("/playlists") => {
                let request: Value = serde_json::from_str(body.unwrap_or("{}")).unwrap_or_default();
                let id = format!("created{}", state.playlists.len());
                let info = PlaylistInfo {
                    id: id.clone(),
                    name: request["name"].as_str().unwrap_or_default().to_string(),
                    public: request["public"].as_bool(),
                };
                state.playlists.push(info);
                ok(201, json!({ "id": id, "name": request["name"], "public": request["public"] }))
            }
            (Method::Put, p) if p.starts_with("/playlists/") && p.ends_with("/tracks") => {
                if let Some(status) = state.replace_failure {
                    return error(status, "replace failed");
                }
                let id = p
                    .trim_start_matches("/playlists/")
                    .trim_end_matches("/tracks")
                    .to_string();
                let request: Value = serde_json::from_str(body.unwrap_or("{}")).unwrap_or_default();
                let uris: Vec<String> = request["uris"]
                    .as_array()
                    .map(|a| a.iter().filter_map(|u| u.as_str().map(str::to_string)).collect())
                    .unwrap_or_default();
                state.playlist_tracks.insert(id, uris);
                ok(201, json!({ "snapshot_id": "snap" }))
            }
            _ => error(404, "no such endpoint"),
        }
    }
}

impl Transport for FakeSpotify {
    fn send(&self, method: Method, url: &str, token: &str, body: Option<&str>) -> Outcome {
        self.state.borrow_mut().requests.push(SentRequest {
            method,
            url: url.to_string(),
            token: token.to_string(),
            body: body.map(str::to_string),
        });

        let relative = url.strip_prefix(BASE_URL).unwrap_or(url);
        let (path, raw_query) = relative.split_once('?').unwrap_or((relative, ""));
        let query = raw_query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .map(|(k, v)| {
                let value = urlencoding::decode(v)
                    .map(|d| d.into_owned())
                    .unwrap_or_else(|_| v.to_string());
                (k.to_string(), value)
            })
            .collect();

        self.route(method, path, &query, body)
    }
}

fn ok(status: u16, body: Value) -> Outcome {
    Outcome::Response {
        status,
        retry_after: None,
        body: body.to_string(),
    }
}

fn error(status: u16, message: &str) -> Outcome {
    ok(status, json!({ "error": { "status": status, "message": message } }))
}
