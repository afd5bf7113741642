//! Live-provider behaviour against a stand-in chat-completion endpoint.

use oasis_engine::EngineConfig;
use oasis_engine::EngineError;
use oasis_engine::GenerateOptions;
use oasis_engine::generate;
use oasis_engine::missing_sections;
use oasis_engine::provider::TOOL_NAME;
use oasis_engine::provider::mock_response;
use oasis_protocol::ResolvedMode;
use oasis_protocol::RiskRequest;
use oasis_protocol::RunMode;
use pretty_assertions::assert_eq;
use serde_json::Value;
use serde_json::json;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::ResponseTemplate;
use wiremock::matchers::body_string_contains;
use wiremock::matchers::header;
use wiremock::matchers::method;
use wiremock::matchers::path;

const ENDPOINT: &str = "/v1/chat/completions";

fn config(server: &MockServer) -> EngineConfig {
    EngineConfig {
        mock_mode: false,
        openai_api_key: Some("sk-test".to_string()),
        openai_base_url: format!("{}/v1", server.uri()),
        request_timeout_secs: 5,
        ..Default::default()
    }
}

fn live() -> GenerateOptions {
    GenerateOptions {
        mode: RunMode::Live,
        ..Default::default()
    }
}

fn request() -> RiskRequest {
    RiskRequest::new("Retail banking", "Operational")
}

fn tool_reply(arguments: &Value, finish_reason: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "id": "chatcmpl-1",
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {
                        "name": TOOL_NAME,
                        "arguments": arguments.to_string(),
                    }
                }]
            },
            "finish_reason": finish_reason,
        }]
    }))
}

fn complete() -> Value {
    serde_json::to_value(mock_response("from-model")).unwrap()
}

fn incomplete() -> Value {
    let mut value = complete();
    value["risks"][1]["control_mappings"] = json!([]);
    value
}

async fn bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect()
}

#[tokio::test]
async fn complete_reply_is_accepted_with_fresh_trace_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(tool_reply(&complete(), "tool_calls"))
        .expect(1)
        .mount(&server)
        .await;

    let generation = generate(&config(&server), &request(), &live()).await.unwrap();
    assert_eq!(generation.resolved_mode, ResolvedMode::Live);
    assert_eq!(generation.resolved_model, "gpt-4o-mini");
    assert_eq!(generation.response.trace_id, generation.trace_id);
    assert!(missing_sections(&generation.response).is_empty());

    let sent = bodies(&server).await;
    assert_eq!(sent[0]["tool_choice"]["function"]["name"], TOOL_NAME);
    assert_eq!(sent[0]["temperature"], json!(0.2));
    assert_eq!(sent[0]["max_tokens"], json!(2000));
    assert_eq!(sent[0]["messages"][0]["role"], "system");
}

#[tokio::test]
async fn incomplete_reply_gets_one_repair_round() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .and(body_string_contains("Violations:"))
        .respond_with(tool_reply(&complete(), "tool_calls"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(tool_reply(&incomplete(), "tool_calls"))
        .expect(1)
        .mount(&server)
        .await;

    let generation = generate(&config(&server), &request(), &live()).await.unwrap();
    assert_eq!(generation.response.risks.len(), 2);

    let sent = bodies(&server).await;
    assert_eq!(sent.len(), 2);
    let repair = sent[1]["messages"].as_array().unwrap();
    assert_eq!(repair.len(), 4);
    assert_eq!(repair[2]["role"], "assistant");
    assert_eq!(repair[2]["content"], incomplete().to_string());
    assert!(
        repair[3]["content"]
            .as_str()
            .unwrap()
            .contains("R2.control_mappings")
    );
}

#[tokio::test]
async fn second_incomplete_reply_exhausts_repair() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(tool_reply(&incomplete(), "tool_calls"))
        .expect(2)
        .mount(&server)
        .await;

    let err = generate(&config(&server), &request(), &live())
        .await
        .unwrap_err();
    match err {
        EngineError::RepairExhausted { missing, .. } => {
            assert_eq!(missing, vec!["R2.control_mappings".to_string()]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn rejected_parameters_fall_back_to_alternate_set() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .and(body_string_contains("\"temperature\""))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {
                "message": "Unsupported parameter: 'temperature' is not supported with this model.",
                "type": "invalid_request_error",
                "param": "temperature",
                "code": "unsupported_parameter"
            }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(tool_reply(&complete(), "tool_calls"))
        .expect(1)
        .mount(&server)
        .await;

    generate(&config(&server), &request(), &live()).await.unwrap();

    let sent = bodies(&server).await;
    assert_eq!(sent.len(), 2);
    assert!(sent[1].get("temperature").is_none());
    assert!(sent[1].get("max_tokens").is_none());
}

#[tokio::test]
async fn other_api_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .expect(1)
        .mount(&server)
        .await;

    let err = generate(&config(&server), &request(), &live())
        .await
        .unwrap_err();
    assert_eq!(err.category().as_str(), "TRANSPORT_ERROR");
    assert!(err.to_string().contains("upstream exploded"));
}

#[tokio::test]
async fn truncated_reply_is_retried_without_cap() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .and(body_string_contains("\"max_tokens\""))
        .respond_with(tool_reply(&json!({"summary": "cut"}), "length"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(tool_reply(&complete(), "tool_calls"))
        .expect(1)
        .mount(&server)
        .await;

    generate(&config(&server), &request(), &live()).await.unwrap();

    let sent = bodies(&server).await;
    assert!(sent[1].get("max_tokens").is_none());
    assert_eq!(sent[1]["temperature"], json!(0.2));
}

#[tokio::test]
async fn truncation_without_cap_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(tool_reply(&json!({"summary": "cut"}), "length"))
        .expect(1)
        .mount(&server)
        .await;

    let options = GenerateOptions {
        model_override: Some("gpt-5-mini".to_string()),
        ..live()
    };
    let err = generate(&config(&server), &request(), &options)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Truncated));
}
