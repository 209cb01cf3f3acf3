//! Results screen

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use evote_engine::{EventId, ResultsScreen};

use crate::common::{EVENT_ID, Harness, mount_results};

#[tokio::test]
async fn results_load_and_compute_shares() {
    let mut h = Harness::signed_in().await;
    mount_results(&h.server).await;

    h.app
        .open_results(EventId::new(EVENT_ID).unwrap())
        .await
        .unwrap();
    h.wait_idle().await;

    let Some(ResultsScreen::Ready { results, .. }) = h.app.results_screen() else {
        panic!("results not ready: {:?}", h.app.results_screen());
    };
    assert_eq!(results.total_votes, 3);
    let alice = &results.options[0];
    assert_eq!(alice.name, "Alice");
    assert!((results.percentage(alice) - 66.666).abs() < 0.01);
}

#[tokio::test]
async fn failed_results_reload() {
    let mut h = Harness::signed_in().await;
    Mock::given(method("GET"))
        .and(path(format!("/event/{EVENT_ID}/stats")))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({ "error": "maintenance" })))
        .up_to_n_times(1)
        .mount(&h.server)
        .await;
    mount_results(&h.server).await;

    h.app
        .open_results(EventId::new(EVENT_ID).unwrap())
        .await
        .unwrap();
    h.wait_idle().await;
    let Some(ResultsScreen::Failed { message, .. }) = h.app.results_screen() else {
        panic!("expected failure: {:?}", h.app.results_screen());
    };
    assert!(message.contains("maintenance"), "{message}");

    h.app.reload();
    h.wait_idle().await;
    assert!(matches!(
        h.app.results_screen(),
        Some(ResultsScreen::Ready { .. })
    ));
}
