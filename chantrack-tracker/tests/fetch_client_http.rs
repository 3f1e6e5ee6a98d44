//! Fetch client over the real reqwest transport against a wiremock backend
//!
//! Coverage:
//! - 2xx JSON decoding
//! - persistent 429 gives up after the attempt cap
//! - 429 followed by success
//! - non-429 errors are not retried
//! - per-request timeout
//! - verification header forwarded on mutations

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use chantrack_tracker::client::{
    ApiRequest, BackendApi, FetchClient, ReqwestTransport, RetryPolicy, TokioSleeper,
    VERIFICATION_HEADER,
};

fn fetch_client(timeout: Duration) -> FetchClient {
    let transport = ReqwestTransport::new(timeout, Duration::from_secs(2)).unwrap();
    FetchClient::new(Arc::new(transport), Arc::new(TokioSleeper), RetryPolicy::default())
}

#[tokio::test]
async fn success_returns_decoded_json() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slack/messageStats"))
        .and(query_param("channelId", "C1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"messageCount": 42})))
        .expect(1)
        .mount(&server)
        .await;

    let client = fetch_client(Duration::from_secs(5));
    let url = format!("{}/slack/messageStats?channelId=C1", server.uri());

    let value = client.fetch_with_retry(&url).await;
    assert_eq!(value, Some(json!({"messageCount": 42})));
}

#[tokio::test]
async fn persistent_rate_limit_stops_after_ten_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/teams"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .expect(10)
        .mount(&server)
        .await;

    let client = fetch_client(Duration::from_secs(5));
    let value = client.fetch_with_retry(&format!("{}/teams", server.uri())).await;

    assert_eq!(value, None);
    // Mock expectations (exactly 10 requests) are verified when the server drops
}

#[tokio::test]
async fn rate_limit_then_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user/profile"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user/profile"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"name": "Op", "email": "op@adobe.com"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = fetch_client(Duration::from_secs(5));
    let value = client
        .fetch_with_retry(&format!("{}/user/profile", server.uri()))
        .await;

    assert_eq!(value, Some(json!({"name": "Op", "email": "op@adobe.com"})));
}

#[tokio::test]
async fn server_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slack/channels"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let client = fetch_client(Duration::from_secs(5));
    let value = client
        .fetch_with_retry(&format!("{}/slack/channels", server.uri()))
        .await;

    assert_eq!(value, None);
}

#[tokio::test]
async fn slow_response_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"ok": true}))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let client = fetch_client(Duration::from_millis(200));
    let value = client.fetch_with_retry(&format!("{}/slow", server.uri())).await;

    assert_eq!(value, None);
}

#[tokio::test]
async fn remove_member_forwards_verification_token() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/teams/T1/members"))
        .and(header(VERIFICATION_HEADER, "tok-1"))
        .and(body_json(json!({"email": "a@adobe.com"})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let fetch = Arc::new(fetch_client(Duration::from_secs(5)));
    let backend = BackendApi::new(fetch, &server.uri()).unwrap();

    backend
        .remove_team_member("T1", "a@adobe.com", "tok-1")
        .await
        .unwrap();
}

#[tokio::test]
async fn send_reports_forbidden_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/teams"))
        .respond_with(ResponseTemplate::new(403).set_body_string("verification failed"))
        .expect(1)
        .mount(&server)
        .await;

    let client = fetch_client(Duration::from_secs(5));
    let request = ApiRequest::post(format!("{}/teams", server.uri()), json!({"displayName": "X"}));

    let err = client.send(&request).await.unwrap_err();
    assert_eq!(err.status(), Some(403));
}
