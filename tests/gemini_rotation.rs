//! End-to-end: generator + Gemini client against a mock Gemini API.

use std::sync::Arc;
use std::time::Duration;

use quizgen::generator::QuizGenerator;
use quizgen::models::GenerationRequest;
use quizgen::provider::GeminiClient;
use quizgen::store::CredentialStore;
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ENDPOINT: &str = "/v1beta/models/gemini-1.5-flash:generateContent";

fn reply_with(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": text}]},
            "finishReason": "STOP"
        }]
    }))
}

#[tokio::test]
async fn test_exhausted_key_is_rotated_out() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .and(header("x-goog-api-key", "key-exhausted"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {
                "code": 429,
                "message": "Resource has been exhausted (e.g. check quota).",
                "status": "RESOURCE_EXHAUSTED"
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let questions = json!([
        {"question_text": "Which planet is known as the Red Planet?", "options": ["Venus", "Mars", "Jupiter", "Saturn"], "correct_answer": "Mars"},
        {"question_text": "What is the largest planet?", "options": ["Earth", "Mars", "Jupiter", "Mercury"], "correct_answer": "jupiter"},
        {"question_text": "Which planet has the most prominent rings?", "options": ["Saturn", "Uranus", "Neptune", "Venus"], "correct_answer": "Saturn"}
    ]);
    let text = format!("Sure! Here you go:\n```json\n{}\n```", questions);

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .and(header("x-goog-api-key", "key-fresh"))
        .respond_with(reply_with(&text))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let store = CredentialStore::load(dir.path().join("api_keys.json"), None).unwrap();
    store.add_credential("key-exhausted").unwrap();
    store.add_credential("key-fresh").unwrap();
    let store = Arc::new(store);

    let client = GeminiClient::new(&server.uri(), "gemini-1.5-flash", Duration::from_secs(5)).unwrap();
    let generator = QuizGenerator::new(store.clone(), client);

    let out = generator
        .generate(&GenerationRequest::new("The Solar System", 3))
        .await
        .unwrap();

    assert_eq!(out.len(), 3);
    assert_eq!(out[1].correct_answer, "Jupiter");

    let persisted: serde_json::Value =
        serde_json::from_slice(&std::fs::read(store.path()).unwrap()).unwrap();
    assert_eq!(persisted["key_status"]["key-exhausted"]["is_active"], false);
    assert_eq!(
        persisted["key_status"]["key-exhausted"]["deactivation_reason"],
        "quota_exceeded"
    );
    assert_eq!(persisted["key_status"]["key-fresh"]["usage_count"], 1);
    assert_eq!(persisted["keys"], json!(["key-exhausted", "key-fresh"]));
}
