use std::time::Duration;

use calorie_tracker::vision::{estimate_calories, CalorieEstimator, GeminiEstimator};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MODEL_PATH: &str = "/v1beta/models/gemini-2.5-flash:generateContent";

fn estimator(server: &MockServer, key: Option<&str>) -> GeminiEstimator {
    GeminiEstimator::new(
        key.map(str::to_string),
        "gemini-2.5-flash",
        Duration::from_secs(5),
    )
    .unwrap()
    .with_base_url(&server.uri())
}

fn answer(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "candidates": [{"content": {"parts": [{"text": text}]}}]
    }))
}

#[tokio::test]
async fn reads_number_from_model_reply() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .and(query_param("key", "test-key"))
        .respond_with(answer("620"))
        .expect(1)
        .mount(&server)
        .await;

    let gemini = estimator(&server, Some("test-key"));
    assert_eq!(estimate_calories(&gemini, b"\xff\xd8jpeg").await.unwrap(), 620);
}

#[tokio::test]
async fn request_carries_prompt_and_inline_jpeg() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .respond_with(answer("about 410 kcal"))
        .mount(&server)
        .await;

    let gemini = estimator(&server, Some("test-key"));
    assert_eq!(gemini.analyze(b"abc").await.unwrap(), "about 410 kcal");

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let parts = &body["contents"][0]["parts"];
    assert!(parts[0]["text"].as_str().unwrap().contains("calories"));
    assert_eq!(parts[1]["inline_data"]["mime_type"], "image/jpeg");
    assert_eq!(parts[1]["inline_data"]["data"], "YWJj");
}

#[tokio::test]
async fn out_of_range_answers_are_clamped() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .respond_with(answer("12000"))
        .mount(&server)
        .await;

    let gemini = estimator(&server, Some("test-key"));
    assert_eq!(estimate_calories(&gemini, b"jpeg").await.unwrap(), 5000);
}

#[tokio::test]
async fn empty_reply_uses_fallback() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
        .mount(&server)
        .await;

    // No text means "0", which clamps up to the floor.
    let gemini = estimator(&server, Some("test-key"));
    assert_eq!(estimate_calories(&gemini, b"jpeg").await.unwrap(), 50);
}

#[tokio::test]
async fn non_json_success_body_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("<html>gateway hiccup</html>", "text/html"),
        )
        .mount(&server)
        .await;

    let gemini = estimator(&server, Some("test-key"));
    let err = estimate_calories(&gemini, b"jpeg").await.unwrap_err();
    assert!(
        err.to_string().contains("unreadable response"),
        "{}",
        err
    );
}

#[tokio::test]
async fn api_error_message_is_surfaced() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"code": 400, "message": "API key not valid"}
        })))
        .mount(&server)
        .await;

    let gemini = estimator(&server, Some("bad-key"));
    let err = estimate_calories(&gemini, b"jpeg").await.unwrap_err();
    let msg = err.to_string();
    assert!(msg.starts_with("Gemini request failed: 400"), "{}", msg);
    assert!(msg.ends_with("API key not valid"), "{}", msg);
}

#[tokio::test]
async fn missing_key_never_calls_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(answer("500"))
        .expect(0)
        .mount(&server)
        .await;

    let gemini = estimator(&server, None);
    let err = gemini.analyze(b"jpeg").await.unwrap_err();
    assert!(err.to_string().contains("GEMINI_API_KEY"));
}
