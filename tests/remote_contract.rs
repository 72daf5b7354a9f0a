//! Remote Service Contract Tests
//!
//! Verify exact HTTP format compliance for the buddy service client:
//! - Query parameters carry the persona id and (for identified users) the
//!   user id
//! - The server's role vocabulary (`model`) maps to the assistant role
//! - Error statuses map to the right error variants
//! - The transcription upload is multipart and rejects empty results

use buddy::api::{ApiClient, PersonaDraft};
use buddy::config::ApiConfig;
use buddy::model::{Avatar, Identity, Message, Role};
use buddy::BuddyError;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> ApiClient {
    ApiClient::new(&ApiConfig {
        base_url: server.uri(),
        request_timeout_secs: 5,
    })
}

// ────────────────────────────────────────────────────────────────────────
// Stored messages
// ────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn fetch_messages_maps_model_role_to_assistant() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/messages"))
        .and(query_param("personality_id", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "role": "user",
                "parts": ["hey"],
                "timestamp": "2026-08-20T09:15:00Z"
            },
            {
                "role": "model",
                "parts": ["hello!"],
                "visual_hint": "#f59e0b",
                "timestamp": "2026-08-20T09:15:04Z"
            }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let messages = client_for(&server)
        .fetch_messages(3, &Identity::Guest)
        .await
        .unwrap();

    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(messages[0].text(), "hey");
    assert_eq!(messages[1].role, Role::Assistant);
    assert_eq!(messages[1].accent.as_deref(), Some("#f59e0b"));
    assert!(!messages[1].streaming);
}

#[tokio::test]
async fn fetch_messages_sends_user_id_for_identified() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/messages"))
        .and(query_param("personality_id", "1"))
        .and(query_param("user_id", "u-42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let messages = client_for(&server)
        .fetch_messages(1, &Identity::Identified("u-42".into()))
        .await
        .unwrap();
    assert!(messages.is_empty());
}

#[tokio::test]
async fn fetch_messages_http_error_is_network() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/messages"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .fetch_messages(1, &Identity::Guest)
        .await
        .unwrap_err();
    assert!(matches!(err, BuddyError::Network(_)));
}

#[tokio::test]
async fn clear_messages_deletes_by_persona_and_user() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/messages"))
        .and(query_param("personality_id", "7"))
        .and(query_param("user_id", "u-9"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    client_for(&server)
        .clear_messages(7, &Identity::Identified("u-9".into()))
        .await
        .unwrap();
}

#[tokio::test]
async fn clear_messages_failure_surfaces() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/messages"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .clear_messages(7, &Identity::Guest)
        .await
        .unwrap_err();
    assert!(matches!(err, BuddyError::Network(_)));
}

// ────────────────────────────────────────────────────────────────────────
// Personas
// ────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn list_personas_decodes_both_avatar_forms() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/personalities"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "id": 1,
                "name": "Max",
                "avatar": {"style": "bottts", "seed": "max-1"},
                "accent": "#6366f1"
            },
            {
                "id": 2,
                "name": "Luna",
                "avatar": "🌙",
                "accent": "#8b5cf6",
                "is_custom": true,
                "owner": "u-9"
            }
        ])))
        .mount(&server)
        .await;

    let personas = client_for(&server)
        .list_personas(&Identity::Guest)
        .await
        .unwrap();

    assert_eq!(personas.len(), 2);
    assert!(matches!(personas[0].avatar, Avatar::Styled { .. }));
    assert!(!personas[0].is_custom);
    assert_eq!(personas[1].avatar, Avatar::Glyph("🌙".into()));
    assert!(personas[1].is_custom);
    assert_eq!(personas[1].owner.as_deref(), Some("u-9"));
}

#[tokio::test]
async fn create_persona_forwards_the_draft() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/personalities"))
        .and(body_partial_json(json!({
            "name": "Pixel",
            "accent": "#22c55e",
            "prompt": "You are a cheerful robot.",
            "user_id": "u-9"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 11,
            "name": "Pixel",
            "avatar": "🤖",
            "accent": "#22c55e",
            "is_custom": true,
            "owner": "u-9"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let persona = client_for(&server)
        .create_persona(&PersonaDraft {
            name: "Pixel".into(),
            avatar: Avatar::Glyph("🤖".into()),
            accent: "#22c55e".into(),
            prompt: "You are a cheerful robot.".into(),
            user_id: Some("u-9".into()),
        })
        .await
        .unwrap();

    assert_eq!(persona.id, 11);
    assert!(persona.is_custom);
}

#[tokio::test]
async fn delete_persona_targets_the_id_path() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/personalities/11"))
        .and(query_param("user_id", "u-9"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    client_for(&server)
        .delete_persona(11, &Identity::Identified("u-9".into()))
        .await
        .unwrap();
}

// ────────────────────────────────────────────────────────────────────────
// Non-streamed chat
// ────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn complete_sends_wire_history_and_decodes_accent_hint() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat"))
        .and(body_partial_json(json!({
            "personality_id": 3,
            "history": [
                {"role": "user", "parts": ["hi"]},
                {"role": "model", "parts": ["hello"]}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "text": "How can I help?",
            "accent_hint": "#f43f5e"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let history = vec![
        Message::user("hi"),
        Message::assistant("hello", None),
    ];
    let reply = client_for(&server)
        .complete(&history, 3, &Identity::Guest)
        .await
        .unwrap();

    assert_eq!(reply.text, "How can I help?");
    assert_eq!(reply.accent_hint.as_deref(), Some("#f43f5e"));
}

// ────────────────────────────────────────────────────────────────────────
// Transcription
// ────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn transcribe_uploads_wav_and_returns_text() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/transcribe"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"text": "hello there"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let text = client_for(&server)
        .transcribe(vec![0u8; 128])
        .await
        .unwrap();
    assert_eq!(text, "hello there");
}

#[tokio::test]
async fn transcribe_empty_text_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/transcribe"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"text": "  "})))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .transcribe(vec![0u8; 128])
        .await
        .unwrap_err();
    assert!(matches!(err, BuddyError::Transcription(_)));
}

#[tokio::test]
async fn transcribe_http_error_is_transcription() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/transcribe"))
        .respond_with(ResponseTemplate::new(422))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .transcribe(vec![0u8; 128])
        .await
        .unwrap_err();
    assert!(matches!(err, BuddyError::Transcription(_)));
}
