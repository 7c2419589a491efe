//! Text moderation driven through the real HTTP classifier client.

use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vigil_app::moderate::{FlagReason, TextModerator};
use vigil_app::services::HttpClassifierClient;

fn classifier_for(server: &MockServer) -> TextModerator {
    let client = HttpClassifierClient::new(server.uri().parse().expect("mock server url"));
    TextModerator::new(Arc::new(client), 0.6)
}

fn score(value: f64) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "score": value }))
}

#[tokio::test]
async fn line_scoring_short_circuits_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/text/offensive"))
        .and(body_json(json!({ "text": "line two" })))
        .respond_with(score(0.9))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/text/offensive"))
        .respond_with(score(0.0))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/text/profanity"))
        .respond_with(score(0.0))
        .expect(1)
        .mount(&server)
        .await;

    let moderator = classifier_for(&server);
    let outcome = moderator
        .moderate_lines("line one\nline two\nline three")
        .await
        .expect("moderate");

    let flag = outcome.flag().expect("flagged");
    assert_eq!(flag.reason, FlagReason::OffensiveLanguage);
    assert_eq!(flag.evidence["line"], "line two");
    // Mock expectations: one scored offensive hit, one clean line before it,
    // one profanity check for that clean line, and nothing for line three.
    server.verify().await;
}

#[tokio::test]
async fn transient_server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/text/offensive"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/text/offensive"))
        .respond_with(score(0.0))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/text/profanity"))
        .respond_with(score(0.0))
        .mount(&server)
        .await;

    let moderator = classifier_for(&server);
    let outcome = moderator.moderate_lines("hello there").await.expect("moderate");
    assert!(outcome.flag().is_none());
}
