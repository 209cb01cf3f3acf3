//! Secure voting flows end to end

use std::time::Duration;

use serde_json::json;

use evote_core::PlatformCall;
use evote_engine::{AppLifecycle, BackAction, EventId, Phase, PlatformProfile, Prompt, VoteScreen};

use crate::common::{EVENT_ID, Harness, mount_event, mount_vote, vote_bodies};

fn phase(h: &Harness) -> Option<Phase> {
    h.app
        .vote_screen()
        .and_then(VoteScreen::session)
        .map(|session| session.phase())
}

async fn open_and_enter(h: &mut Harness) {
    mount_event(&h.server, false).await;
    h.app.open_event(EventId::new(EVENT_ID).unwrap()).await.unwrap();
    h.wait_idle().await;
    assert_eq!(phase(h), Some(Phase::PreEntry));

    h.app.enter_secure_mode().unwrap();
    assert_eq!(h.app.pending_prompt(), Some(Prompt::ConfirmEntry));
    h.app.answer_prompt(true).unwrap();
    assert_eq!(phase(h), Some(Phase::SelectingOption));
}

#[tokio::test]
async fn vote_for_alice_round_trip() {
    let mut h = Harness::signed_in().await;
    mount_vote(&h.server, 200, json!({ "message": "Vote recorded" }), None).await;
    open_and_enter(&mut h).await;

    h.app.select("Alice").unwrap();
    h.app.submit().unwrap();
    h.wait_idle().await;

    assert_eq!(phase(&h), Some(Phase::Confirmed));
    assert_eq!(
        vote_bodies(&h.server).await,
        vec![json!({ "optionName": "Alice" })]
    );
    assert!(
        h.app
            .take_notifications()
            .contains(&"Your vote for Alice has been recorded.".to_string())
    );
    assert_eq!(
        h.platform.calls(),
        vec![
            PlatformCall::LockPortrait,
            PlatformCall::WatchLifecycle(true),
            PlatformCall::InterceptBack(true),
            PlatformCall::InterceptBack(false),
            PlatformCall::WatchLifecycle(false),
            PlatformCall::UnlockOrientation,
        ]
    );

    h.app.acknowledge_confirmation().unwrap();
    assert_eq!(phase(&h), Some(Phase::PreEntry));
}

#[tokio::test]
async fn acknowledged_vote_cannot_be_recast() {
    let mut h = Harness::signed_in().await;
    mount_vote(&h.server, 200, json!({ "message": "Vote recorded" }), None).await;
    open_and_enter(&mut h).await;
    h.app.select("Alice").unwrap();
    h.app.submit().unwrap();
    h.wait_idle().await;
    h.app.acknowledge_confirmation().unwrap();

    assert!(h.app.enter_secure_mode().is_err());
    assert!(h.app.answer_prompt(true).is_err());
    assert!(h.app.submit().is_err());
    h.wait_idle().await;
    assert_eq!(
        vote_bodies(&h.server).await,
        vec![json!({ "optionName": "Alice" })]
    );
}

#[tokio::test]
async fn late_success_after_background_is_discarded() {
    let mut h = Harness::signed_in().await;
    mount_vote(
        &h.server,
        200,
        json!({ "message": "Vote recorded" }),
        Some(Duration::from_millis(300)),
    )
    .await;
    open_and_enter(&mut h).await;

    h.app.select("Bob").unwrap();
    h.app.submit().unwrap();
    assert_eq!(phase(&h), Some(Phase::Submitting));

    assert!(h.app.lifecycle(AppLifecycle::Background));
    assert_eq!(phase(&h), Some(Phase::PreEntry));
    h.wait_idle().await;

    // The server did record it; the screen must not claim so.
    assert_eq!(vote_bodies(&h.server).await.len(), 1);
    assert_eq!(phase(&h), Some(Phase::PreEntry));
    let notes = h.app.take_notifications();
    assert!(notes.iter().any(|n| n.contains("interrupted")), "{notes:?}");
    assert!(!notes.iter().any(|n| n.contains("recorded")), "{notes:?}");
}

#[tokio::test]
async fn server_already_voted_is_final() {
    let mut h = Harness::signed_in().await;
    mount_vote(&h.server, 400, json!({ "message": "User has already voted" }), None).await;
    open_and_enter(&mut h).await;

    h.app.select("opt-bob").unwrap();
    h.app.submit().unwrap();
    h.wait_idle().await;

    assert_eq!(phase(&h), Some(Phase::AlreadyVoted));
    assert!(h.app.enter_secure_mode().is_err());
    let session = h.app.vote_screen().and_then(VoteScreen::session).unwrap();
    assert!(!session.is_locked());
}

#[tokio::test]
async fn has_voted_event_never_offers_entry() {
    let mut h = Harness::signed_in().await;
    mount_event(&h.server, true).await;
    h.app.open_event(EventId::new(EVENT_ID).unwrap()).await.unwrap();
    h.wait_idle().await;

    assert_eq!(phase(&h), Some(Phase::AlreadyVoted));
    assert!(h.app.enter_secure_mode().is_err());
    assert!(h.platform.calls().is_empty());
}

#[tokio::test]
async fn server_error_keeps_selection_for_retry() {
    let mut h = Harness::signed_in().await;
    mount_vote(&h.server, 500, json!({ "message": "database unavailable" }), None).await;
    open_and_enter(&mut h).await;

    h.app.select("Alice").unwrap();
    h.app.submit().unwrap();
    h.wait_idle().await;

    assert_eq!(phase(&h), Some(Phase::SelectingOption));
    let session = h.app.vote_screen().and_then(VoteScreen::session).unwrap();
    assert!(session.is_locked());
    assert!(session.can_submit());
    assert_eq!(vote_bodies(&h.server).await.len(), 1);
    let notes = h.app.take_notifications();
    assert!(
        notes.iter().any(|n| n.contains("database unavailable")),
        "{notes:?}"
    );
}

#[tokio::test]
async fn confirmed_back_exit_discards_attempt() {
    let mut h = Harness::signed_in().await;
    open_and_enter(&mut h).await;
    h.app.select("Alice").unwrap();

    assert_eq!(h.app.back().await, BackAction::Consumed);
    h.app.answer_prompt(false).unwrap();
    assert_eq!(phase(&h), Some(Phase::SelectingOption));

    assert_eq!(h.app.back().await, BackAction::Consumed);
    h.app.answer_prompt(true).unwrap();
    assert_eq!(phase(&h), Some(Phase::PreEntry));
    assert!(vote_bodies(&h.server).await.is_empty());
}

#[tokio::test]
async fn degraded_profile_votes_without_platform_hooks() {
    let mut h = Harness::build(PlatformProfile::Degraded, true).await;
    mount_vote(&h.server, 200, json!({}), None).await;
    open_and_enter(&mut h).await;

    assert!(!h.app.lifecycle(AppLifecycle::Background));
    assert_eq!(h.app.back().await, BackAction::PassThrough);

    // Back left the vote screen; reopen and vote.
    open_and_enter(&mut h).await;
    h.app.select("Bob").unwrap();
    h.app.submit().unwrap();
    h.wait_idle().await;

    assert_eq!(phase(&h), Some(Phase::Confirmed));
    assert!(h.platform.calls().is_empty());
}
