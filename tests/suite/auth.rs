//! Session guard behaviour against a mock server

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use evote_engine::{CredentialStore, EventId, GuardState, Route};

use crate::common::{EVENT_ID, Harness, TOKEN, mount_event, mount_sign_in};

fn evt1() -> EventId {
    EventId::new(EVENT_ID).unwrap()
}

#[tokio::test]
async fn sign_in_persists_credential_file() {
    let mut h = Harness::signed_out().await;
    mount_sign_in(&h.server).await;
    assert_eq!(h.app.guard_state(), GuardState::Unauthenticated);

    h.app.sign_in("ada@example.com", "secret").unwrap();
    h.wait_idle().await;

    assert_eq!(h.app.guard_state(), GuardState::Authenticated);
    assert_eq!(h.app.current().route, Route::Tabs);
    let token = h.store.get_token().await.unwrap().unwrap();
    assert_eq!(token.expose_secret(), TOKEN);

    let raw = std::fs::read_to_string(h.store.path()).unwrap();
    let stored: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(stored["token"], TOKEN);
    assert_eq!(stored["user"]["name"], "Ada");

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(h.store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}

#[tokio::test]
async fn bad_password_keeps_user_signed_out() {
    let mut h = Harness::signed_out().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "message": "Invalid credentials"
        })))
        .mount(&h.server)
        .await;

    h.app.sign_in("ada@example.com", "nope").unwrap();
    h.wait_idle().await;

    assert_eq!(h.app.guard_state(), GuardState::Unauthenticated);
    assert!(h.store.get_token().await.unwrap().is_none());
    assert!(!h.store.path().exists());
    assert_eq!(
        h.app.take_notifications(),
        vec!["Invalid email or password.".to_string()]
    );
}

#[tokio::test]
async fn signed_out_gated_routes_always_redirect_without_network() {
    let mut h = Harness::signed_out().await;

    let first = h.app.open_event(evt1()).await.unwrap();
    assert!(!first.authenticated);
    assert!(first.redirected);
    assert_eq!(h.app.current().route, Route::SignIn);

    // The sign-in screen is showing, so the next gated route redirects again
    // rather than staying on screen.
    let second = h.app.open_results(evt1()).await.unwrap();
    assert!(!second.authenticated);
    assert!(second.redirected);
    assert_eq!(h.app.current().route, Route::SignIn);
    assert!(h.app.results_screen().is_none());

    assert!(h.server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn expired_token_on_fetch_clears_store_and_redirects() {
    let mut h = Harness::signed_in().await;
    assert_eq!(h.app.guard_state(), GuardState::Authenticated);
    Mock::given(method("GET"))
        .and(path(format!("/event/{EVENT_ID}")))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "message": "jwt expired"
        })))
        .mount(&h.server)
        .await;

    h.app.open_event(evt1()).await.unwrap();
    h.wait_idle().await;

    assert!(h.store.get_token().await.unwrap().is_none());
    assert!(!h.store.path().exists());
    assert_eq!(h.app.guard_state(), GuardState::Unauthenticated);
    assert_eq!(h.app.current().route, Route::SignIn);
    assert!(h.app.vote_screen().is_none());
    assert!(
        h.app
            .take_notifications()
            .iter()
            .any(|n| n.contains("session has expired"))
    );
}

#[tokio::test]
async fn sign_in_after_redirect_then_open_event() {
    let mut h = Harness::signed_out().await;
    mount_sign_in(&h.server).await;
    mount_event(&h.server, false).await;

    h.app.open_event(evt1()).await.unwrap();
    assert_eq!(h.app.current().route, Route::SignIn);

    h.app.sign_in("ada@example.com", "secret").unwrap();
    h.wait_idle().await;
    assert_eq!(h.app.current().route, Route::Tabs);

    let decision = h.app.open_event(evt1()).await.unwrap();
    assert!(decision.authenticated);
    h.wait_idle().await;
    let session = h.app.vote_screen().and_then(|s| s.session()).unwrap();
    assert_eq!(session.title(), Some("Board election"));
}

#[tokio::test]
async fn sign_out_removes_credential_file() {
    let mut h = Harness::signed_in().await;
    assert!(h.store.path().exists());

    h.app.sign_out().await;

    assert!(!h.store.path().exists());
    assert_eq!(h.app.guard_state(), GuardState::Unauthenticated);
    assert_eq!(h.app.current().route, Route::SignIn);
}
