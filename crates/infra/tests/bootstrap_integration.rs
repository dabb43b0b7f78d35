//! Implicit-flow sign-in against a mock provider

#[path = "support.rs"]
mod support;

use std::sync::Arc;

use restline_common::testing::StaticIdTokenVerifier;
use restline_common::ApiError;
use serde_json::json;
use support::{EventLog, Harness, CALLBACK_URL};
use url::Url;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, ResponseTemplate};

async fn mount_who_am_i(harness: &Harness, token: &str, body: serde_json::Value, calls: u64) {
    Mock::given(method("GET"))
        .and(path("/v1/accounts/me"))
        .and(header("Authorization", token))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(calls)
        .mount(&harness.server)
        .await;
}

#[tokio::test]
async fn matching_state_installs_bearer_session() {
    let harness = Harness::start().await;
    harness.store_state("S");
    harness.land_on("token_type=Bearer&access_token=T&state=S");
    mount_who_am_i(&harness, "Bearer T", json!({"id": "42"}), 1).await;

    let client = harness.client();
    assert!(client.try_resume_from_redirect().await.unwrap());

    let session = client.session().expect("session");
    assert_eq!(session.token, "Bearer T");
    assert_eq!(session.id, "42");
    assert!(!session.uses_token);
    assert_eq!(harness.host.replaced(), vec![Url::parse(CALLBACK_URL).unwrap()]);
}

#[tokio::test]
async fn mismatched_state_reports_and_installs_nothing() {
    let harness = Harness::start().await;
    harness.store_state("S-prime");
    harness.land_on("token_type=Bearer&access_token=T&state=S");
    mount_who_am_i(&harness, "Bearer T", json!({"id": "42"}), 0).await;

    let client = harness.client();
    let events = EventLog::attach(&client);

    assert!(!client.try_resume_from_redirect().await.unwrap());
    assert!(!client.is_authenticated());
    let errors = events.errors();
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], ApiError::AntiForgeryMismatch));
}

#[tokio::test]
async fn ignoring_state_accepts_any_callback() {
    let harness = Harness::start().await;
    harness.land_on("access_token=T");
    mount_who_am_i(&harness, "Bearer T", json!({"id": 7}), 1).await;

    let client = harness.builder(harness.config().ignoring_anti_forgery_state(true)).build().unwrap();
    assert!(client.try_resume_from_redirect().await.unwrap());
    assert_eq!(client.account_id().as_deref(), Some("7"));
}

#[tokio::test]
async fn plain_location_is_left_alone() {
    let harness = Harness::start().await;
    harness.land_on("section-2");
    let client = harness.client();

    assert!(!client.try_resume_from_redirect().await.unwrap());
    assert!(harness.host.replaced().is_empty());
    assert!(harness.server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn sign_in_url_carries_flow_parameters() {
    let harness = Harness::start().await;
    harness.store_state("S");
    let client = harness
        .builder(
            harness
                .config()
                .with_authorize_url("https://auth.test/oauth/authorize")
                .with_scopes(["read", "write"]),
        )
        .build()
        .unwrap();

    let url = client.begin_interactive().unwrap();
    let query = url.query().unwrap();
    assert!(url.as_str().starts_with("https://auth.test/oauth/authorize?"));
    assert!(query.contains("client_id=app-1"));
    assert!(query.contains("response_type=token&"));
    assert!(query.contains("redirect_uri=https%3A%2F%2Fapp.test%2Fcallback"));
    assert!(query.contains("scope=read%20write"));
    assert!(query.contains("state=S"));
    assert!(!query.contains("nonce="));
}

#[tokio::test]
async fn openid_scope_requests_identity_token() {
    let harness = Harness::start().await;
    let client = harness
        .builder(harness.config().with_scopes(["openid", "profile"]).ignoring_anti_forgery_state(true))
        .build()
        .unwrap();

    let url = client.begin_interactive().unwrap();
    let query = url.query().unwrap();
    assert!(query.contains("response_type=token%20id_token"));
    assert!(query.contains("nonce="));
    assert!(!query.contains("state="));
}

#[tokio::test]
async fn identity_token_claims_and_fragment_lifetime() {
    let harness = Harness::start().await;
    harness.store_state("S");
    harness.land_on("access_token=T&state=S&id_token=ID&expires_in=3600");
    mount_who_am_i(&harness, "Bearer T", json!({"id": "42"}), 1).await;

    let client = harness
        .builder(harness.config().with_scopes(["openid"]).decoding_identity_token(true))
        .id_token_verifier(Arc::new(StaticIdTokenVerifier::new().accepting("ID", json!({"sub": "42"}))))
        .build()
        .unwrap();

    let before = client.session_store().now_millis();
    assert!(client.try_resume_from_redirect().await.unwrap());

    let session = client.session().unwrap();
    assert_eq!(session.id_token.as_deref(), Some("ID"));
    assert_eq!(session.id_token_claims, Some(json!({"sub": "42"})));
    let expiration = session.expiration.unwrap();
    assert!(expiration >= before + 3_600_000);
    assert!(client.session_store().has_pending_timer());
}

#[tokio::test]
async fn enormous_fragment_lifetime_saturates() {
    let harness = Harness::start().await;
    harness.store_state("S");
    harness.land_on("token_type=Bearer&access_token=T&state=S&expires_in=9223372036854775807");
    mount_who_am_i(&harness, "Bearer T", json!({"id": "42"}), 1).await;

    let client = harness.client();
    assert!(client.try_resume_from_redirect().await.unwrap());

    let session = client.session().unwrap();
    assert_eq!(session.expiration, Some(i64::MAX));
    assert!(client.session_store().has_pending_timer());
}

#[tokio::test]
async fn negative_fragment_lifetime_is_ignored() {
    let harness = Harness::start().await;
    harness.store_state("S");
    harness.land_on("access_token=T&state=S&expires_in=-30");
    mount_who_am_i(&harness, "Bearer T", json!({"id": "42"}), 1).await;

    let client = harness.client();
    assert!(client.try_resume_from_redirect().await.unwrap());
    assert_eq!(client.session().unwrap().expiration, None);
}

#[tokio::test]
async fn who_am_i_expiration_wins_over_fragment() {
    let harness = Harness::start().await;
    harness.land_on("access_token=T&expires_in=60");
    let far = 4_102_444_800_i64; // 2100-01-01
    mount_who_am_i(&harness, "Bearer T", json!({"id": "42", "expiration": far}), 1).await;

    let client = harness.builder(harness.config().ignoring_anti_forgery_state(true)).build().unwrap();
    assert!(client.try_resume_from_redirect().await.unwrap());
    assert_eq!(client.session().unwrap().expiration, Some(far * 1000));
}

#[tokio::test]
async fn bare_token_is_sent_as_bearer() {
    let harness = Harness::start().await;
    mount_who_am_i(&harness, "Bearer abc", json!({"id": "9"}), 1).await;

    let client = harness.client();
    let session = client.sign_in_with_token("abc").await.unwrap();
    assert!(session.uses_token);
    assert_eq!(client.session_store().current_token().as_deref(), Some("Bearer abc"));
}

#[tokio::test]
async fn who_am_i_rate_limit_goes_through_retry_engine() {
    let harness = Harness::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/accounts/me"))
        .respond_with(
            ResponseTemplate::new(429).set_body_json(json!({"@error": {"@rateLimit": {"Retry-After": 2}}})),
        )
        .up_to_n_times(2)
        .mount(&harness.server)
        .await;
    mount_who_am_i(&harness, "Bearer abc", json!({"id": "9"}), 1).await;

    let client = harness.client();
    client.sign_in_with_token("abc").await.unwrap();
    assert_eq!(harness.sleeper.waits().len(), 2);
    assert!(harness.sleeper.waits().iter().all(|w| w.as_secs() == 2));
}

#[tokio::test]
async fn who_am_i_failure_propagates() {
    let harness = Harness::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/accounts/me"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({"message": "nope"})))
        .mount(&harness.server)
        .await;

    let client = harness.client();
    let err = client.sign_in_with_token("abc").await.unwrap_err();
    assert_eq!(err.status(), Some(403));
    assert!(!client.is_authenticated());
}
