//! Shared test utilities and fixtures
//!
//! A mock voting server plus an [`App`] wired to it through the real HTTP
//! client and a file-backed credential store.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use evote_core::RecordingPlatform;
use evote_engine::{App, FileCredentialStore, PlatformProfile, Settings};

pub const TOKEN: &str = "test-token";
pub const EVENT_ID: &str = "evt1";
pub const IDLE: Duration = Duration::from_secs(5);

pub struct Harness {
    pub server: MockServer,
    pub app: App,
    pub store: Arc<FileCredentialStore>,
    pub platform: Arc<RecordingPlatform>,
    _dir: TempDir,
}

impl Harness {
    /// App without a stored credential.
    pub async fn signed_out() -> Self {
        Self::build(PlatformProfile::Full, false).await
    }

    /// App whose credential file already holds [`TOKEN`].
    pub async fn signed_in() -> Self {
        Self::build(PlatformProfile::Full, true).await
    }

    pub async fn build(profile: PlatformProfile, with_token: bool) -> Self {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let credentials = dir.path().join("credentials.json");
        if with_token {
            std::fs::write(
                &credentials,
                serde_json::to_vec(&json!({ "token": TOKEN, "user": { "name": "Ada" } })).unwrap(),
            )
            .unwrap();
        }

        let settings = Settings {
            api_base_url: server.uri(),
            request_timeout: Duration::from_secs(5),
            max_retries: 0,
            platform: profile,
            credentials_path: Some(credentials.clone()),
        };
        let store = Arc::new(FileCredentialStore::new(credentials));
        let platform = Arc::new(RecordingPlatform::new());
        let mut app = App::from_settings(&settings, store.clone(), platform.clone()).unwrap();
        app.start().await;

        Self {
            server,
            app,
            store,
            platform,
            _dir: dir,
        }
    }

    pub async fn wait_idle(&mut self) {
        assert!(self.app.wait_idle(IDLE).await, "app did not go idle");
    }
}

pub fn event_body(has_voted: bool) -> Value {
    json!({
        "_id": EVENT_ID,
        "title": "Board election",
        "description": "Annual board seat",
        "options": [
            { "_id": "opt-alice", "name": "Alice" },
            { "_id": "opt-bob", "name": "Bob" }
        ],
        "hasVoted": has_voted
    })
}

pub async fn mount_sign_in(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": TOKEN,
            "user": { "name": "Ada", "email": "ada@example.com" }
        })))
        .mount(server)
        .await;
}

pub async fn mount_event(server: &MockServer, has_voted: bool) {
    Mock::given(method("GET"))
        .and(path(format!("/event/{EVENT_ID}")))
        .and(header("authorization", format!("Bearer {TOKEN}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(event_body(has_voted)))
        .mount(server)
        .await;
}

/// Vote endpoint answering with `status` and `body`, optionally after `delay`.
pub async fn mount_vote(server: &MockServer, status: u16, body: Value, delay: Option<Duration>) {
    let mut response = ResponseTemplate::new(status).set_body_json(body);
    if let Some(delay) = delay {
        response = response.set_delay(delay);
    }
    Mock::given(method("POST"))
        .and(path(format!("/event/{EVENT_ID}/vote")))
        .respond_with(response)
        .mount(server)
        .await;
}

pub async fn mount_results(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(format!("/event/{EVENT_ID}/stats")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "eventId": EVENT_ID,
            "totalVotes": 3,
            "options": [
                { "name": "Alice", "votes": 2 },
                { "name": "Bob", "votes": 1 }
            ]
        })))
        .mount(server)
        .await;
}

/// Bodies of every vote request the server saw.
pub async fn vote_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|request| request.url.path().ends_with("/vote"))
        .map(|request| serde_json::from_slice(&request.body).unwrap())
        .collect()
}
