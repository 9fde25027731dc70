//! Direct Line wire contract against a mock channel.

use parley_voice::{
    ConversationBackend, ConversationConfig, ConversationError, DirectLineBackend, TokenExchange,
};
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CONVERSATIONS: &str = "/v3/directline/conversations";
const ACTIVITIES: &str = "/v3/directline/conversations/conv-1/activities";

fn config(server: &MockServer) -> ConversationConfig {
    ConversationConfig {
        direct_line_endpoint: server.uri(),
        direct_line_secret: Some("dl-secret".to_string()),
        user_id: "user-7".to_string(),
        poll_interval_ms: 10,
        reply_timeout_ms: 2_000,
        ..Default::default()
    }
}

async fn mount_conversation(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(CONVERSATIONS))
        .and(header("authorization", "Bearer dl-secret"))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!({"conversationId": "conv-1", "token": "conv-token"})),
        )
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_post(server: &MockServer, body: Value) {
    Mock::given(method("POST"))
        .and(path(ACTIVITIES))
        .and(header("authorization", "Bearer conv-token"))
        .and(body_partial_json(body))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "act-1"})))
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_poll(server: &MockServer, activities: Value) {
    Mock::given(method("GET"))
        .and(path(ACTIVITIES))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"activities": activities, "watermark": "1"})),
        )
        .mount(server)
        .await;
}

fn echo_of_user(text: &str) -> Value {
    json!({
        "type": "message",
        "id": "act-1",
        "from": {"id": "user-7", "role": "user"},
        "text": text,
    })
}

#[tokio::test]
async fn message_reply_is_folded_from_bot_activities() {
    let server = MockServer::start().await;
    mount_conversation(&server).await;
    mount_post(
        &server,
        json!({"type": "message", "text": "status?", "from": {"id": "user-7"}, "locale": "en-US"}),
    )
    .await;
    mount_poll(
        &server,
        json!([
            echo_of_user("status?"),
            {"type": "typing", "id": "t-1", "from": {"id": "bot", "role": "bot"}},
            {"type": "message", "id": "b-1", "replyToId": "act-1",
             "from": {"id": "bot", "role": "bot"}, "text": "All systems **green** [1]."},
            {"type": "message", "id": "b-2", "replyToId": "act-1",
             "from": {"id": "bot", "role": "bot"}, "text": "Anything else?"}
        ]),
    )
    .await;

    let backend = DirectLineBackend::from_config(&config(&server)).unwrap();
    let reply = backend.send_message("status?").await.unwrap();

    assert_eq!(reply.bot_reply, "All systems **green** [1].\n\nAnything else?");
    assert_eq!(
        reply.speech_text.as_deref(),
        Some("All systems green. Anything else?")
    );
    assert!(reply.signin_card.is_none());
    assert_eq!(backend.conversation_id().await.as_deref(), Some("conv-1"));
}

#[tokio::test]
async fn oauth_card_is_extracted() {
    let server = MockServer::start().await;
    mount_conversation(&server).await;
    mount_post(&server, json!({"type": "message", "text": "my calendar"})).await;
    mount_poll(
        &server,
        json!([{
            "type": "message",
            "id": "b-1",
            "replyToId": "act-1",
            "from": {"id": "bot", "role": "bot"},
            "attachments": [{
                "contentType": "application/vnd.microsoft.card.oauth",
                "content": {
                    "text": "Please sign in to continue.",
                    "connectionName": "outlook",
                    "buttons": [{"type": "signin", "title": "Sign in"}],
                    "tokenExchangeResource": {"id": "res-42", "uri": "api://bot-123"}
                }
            }]
        }]),
    )
    .await;

    let backend = DirectLineBackend::from_config(&config(&server)).unwrap();
    let reply = backend.send_message("my calendar").await.unwrap();

    assert!(!reply.has_text());
    let card = reply.signin_card.expect("oauth card");
    assert_eq!(card.title, "Sign in");
    assert_eq!(card.message, "Please sign in to continue.");
    assert_eq!(card.exchange_uri(), Some("api://bot-123"));
    assert_eq!(card.connection_name.as_deref(), Some("outlook"));
    assert_eq!(card.token_exchange_resource_id.as_deref(), Some("res-42"));
}

#[tokio::test]
async fn token_exchange_posts_invoke_activity() {
    let server = MockServer::start().await;
    mount_conversation(&server).await;
    mount_post(
        &server,
        json!({
            "type": "invoke",
            "name": "signin/tokenExchange",
            "value": {"id": "res-42", "connectionName": "outlook", "token": "user-token"}
        }),
    )
    .await;
    mount_poll(
        &server,
        json!([{"type": "message", "id": "b-1", "replyToId": "act-1",
                "from": {"id": "bot", "role": "bot"}, "text": "You're signed in."}]),
    )
    .await;

    let backend = DirectLineBackend::from_config(&config(&server)).unwrap();
    let reply = backend
        .exchange_connection_token(&TokenExchange {
            token: "user-token".to_string(),
            connection_name: "outlook".to_string(),
            resource_id: "res-42".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(reply.bot_reply, "You're signed in.");
}

#[tokio::test]
async fn card_submit_carries_payload_as_value() {
    let server = MockServer::start().await;
    mount_conversation(&server).await;
    mount_post(
        &server,
        json!({"type": "message", "value": {"action": "Allow", "id": "consent-1"}}),
    )
    .await;
    mount_poll(
        &server,
        json!([{"type": "message", "id": "b-1", "from": {"id": "bot"}, "text": "Thanks."}]),
    )
    .await;

    let backend = DirectLineBackend::from_config(&config(&server)).unwrap();
    let reply = backend
        .submit_card_action(&json!({"action": "Allow", "id": "consent-1"}))
        .await
        .unwrap();

    assert_eq!(reply.bot_reply, "Thanks.");
}

#[tokio::test]
async fn polling_resumes_from_watermark() {
    let server = MockServer::start().await;
    mount_conversation(&server).await;
    mount_post(&server, json!({"type": "message"})).await;
    Mock::given(method("GET"))
        .and(path(ACTIVITIES))
        .and(query_param("watermark", "1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"activities": [], "watermark": "1"})),
        )
        .with_priority(1)
        .expect(1..)
        .mount(&server)
        .await;
    mount_poll(
        &server,
        json!([{"type": "message", "id": "b-1", "from": {"id": "bot", "role": "bot"},
                "text": "pong"}]),
    )
    .await;

    let backend = DirectLineBackend::from_config(&config(&server)).unwrap();
    let reply = backend.send_message("ping").await.unwrap();

    assert_eq!(reply.bot_reply, "pong");
}

#[tokio::test]
async fn no_reply_times_out() {
    let server = MockServer::start().await;
    mount_conversation(&server).await;
    mount_post(&server, json!({"type": "message"})).await;
    mount_poll(&server, json!([echo_of_user("hello?")])).await;

    let mut cfg = config(&server);
    cfg.reply_timeout_ms = 60;
    let backend = DirectLineBackend::from_config(&cfg).unwrap();
    let err = backend.send_message("hello?").await.unwrap_err();

    assert!(matches!(err, ConversationError::Backend(ref m) if m.contains("no bot reply")));
}

#[tokio::test]
async fn silent_token_exchange_yields_an_empty_reply() {
    let server = MockServer::start().await;
    mount_conversation(&server).await;
    mount_post(&server, json!({"type": "invoke", "name": "signin/tokenExchange"})).await;
    mount_poll(
        &server,
        json!([{"type": "invokeResponse", "id": "ir-1", "from": {"id": "bot", "role": "bot"}}]),
    )
    .await;

    let mut cfg = config(&server);
    cfg.reply_timeout_ms = 60;
    let backend = DirectLineBackend::from_config(&cfg).unwrap();
    let reply = backend
        .exchange_connection_token(&TokenExchange {
            token: "user-token".to_string(),
            connection_name: "outlook".to_string(),
            resource_id: "res-42".to_string(),
        })
        .await
        .unwrap();

    assert!(!reply.has_text());
    assert!(reply.signin_card.is_none());
}

#[tokio::test]
async fn channel_rejection_is_a_backend_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CONVERSATIONS))
        .respond_with(ResponseTemplate::new(403).set_body_string("bad secret"))
        .mount(&server)
        .await;

    let backend = DirectLineBackend::from_config(&config(&server)).unwrap();
    let err = backend.send_message("hi").await.unwrap_err();

    assert!(matches!(err, ConversationError::Backend(ref m) if m.contains("403")));
    assert!(backend.conversation_id().await.is_none());
}

#[test]
fn missing_secret_is_a_config_error() {
    let err = DirectLineBackend::from_config(&ConversationConfig::default()).err();
    assert!(matches!(err, Some(ConversationError::Config(_))));
}
