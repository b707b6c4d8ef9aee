//! HTTP adapter tests against a mocked agent service.

use std::collections::HashMap;
use std::time::Duration;

use hosted_agent_sdk::service::{ListOrder, MessageContent, MessageRole, RunRequest, ToolOutput};
use hosted_agent_sdk::{
    AgentService, Credential, HttpAgentService, HttpServiceConfig, RetryPolicy, RunStatus,
    ServiceError,
};
use serde_json::json;
use wiremock::matchers::{body_json, body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn service(server: &MockServer, retry: RetryPolicy) -> HttpAgentService {
    let mut config = HttpServiceConfig::new(server.uri(), Credential::ApiKey("test-key".to_string()));
    config.api_version = "2024-07-01-preview".to_string();
    config.retry = retry;
    HttpAgentService::new(config).expect("client builds")
}

fn fast_retries(max_retries: u32) -> RetryPolicy {
    RetryPolicy::new(max_retries).with_delays(
        Duration::from_millis(1),
        Duration::from_millis(1),
        Duration::from_millis(5),
    )
}

#[tokio::test]
async fn create_run_posts_agent_id_and_token_cap() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/threads/thread_1/runs"))
        .and(query_param("api-version", "2024-07-01-preview"))
        .and(header("api-key", "test-key"))
        .and(body_json(json!({"assistant_id": "asst_1", "max_completion_tokens": 4000})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "run_1",
            "thread_id": "thread_1",
            "status": "queued"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let run = service(&server, RetryPolicy::none())
        .create_run(
            "thread_1",
            &RunRequest {
                agent_id: "asst_1".to_string(),
                instructions: None,
                max_completion_tokens: Some(4000),
            },
        )
        .await
        .expect("run created");

    assert_eq!(run.id, "run_1");
    assert_eq!(run.status, RunStatus::Queued);
    assert!(run.pending_tool_calls.is_none());
}

#[tokio::test]
async fn get_run_reads_pending_tool_calls() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/threads/thread_1/runs/run_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "run_1",
            "thread_id": "thread_1",
            "status": "requires_action",
            "required_action": {
                "type": "submit_tool_outputs",
                "submit_tool_outputs": {
                    "tool_calls": [
                        {"id": "call_a", "type": "function", "function": {"name": "calculate_cost", "arguments": "{\"resource_type\":\"vm\",\"tier\":\"basic\"}"}},
                        {"id": "call_b", "type": "function", "function": {"name": "lookup_customer", "arguments": ""}}
                    ]
                }
            }
        })))
        .mount(&server)
        .await;

    let run = service(&server, RetryPolicy::none())
        .get_run("thread_1", "run_1")
        .await
        .expect("run fetched");

    let calls = run.pending_tool_calls.expect("tool calls present");
    assert_eq!(run.status, RunStatus::RequiresAction);
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].id, "call_a");
    assert_eq!(calls[0].name, "calculate_cost");
    assert_eq!(calls[1].arguments, "");
}

#[tokio::test]
async fn submit_tool_outputs_sends_all_outputs_once() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/threads/thread_1/runs/run_1/submit_tool_outputs"))
        .and(body_json(json!({
            "tool_outputs": [
                {"tool_call_id": "call_a", "output": "{\"cost\":36.5}"},
                {"tool_call_id": "call_b", "output": "{\"error\":\"tool not found: nope\"}"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "run_1",
            "thread_id": "thread_1",
            "status": "queued"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let outputs = [
        ToolOutput {
            tool_call_id: "call_a".to_string(),
            output: "{\"cost\":36.5}".to_string(),
        },
        ToolOutput {
            tool_call_id: "call_b".to_string(),
            output: "{\"error\":\"tool not found: nope\"}".to_string(),
        },
    ];

    let run = service(&server, RetryPolicy::none())
        .submit_tool_outputs("thread_1", "run_1", &outputs)
        .await
        .expect("outputs accepted");
    assert_eq!(run.status, RunStatus::Queued);
}

#[tokio::test]
async fn unauthorized_maps_to_authentication_without_retry() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/threads"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"code": "401", "message": "Access denied due to invalid subscription key."}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = service(&server, fast_retries(3))
        .create_thread(&HashMap::new())
        .await
        .expect_err("must fail");

    match err {
        ServiceError::Authentication(detail) => assert!(detail.contains("invalid subscription key")),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn missing_run_maps_to_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/threads/thread_1/runs/run_404"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = service(&server, RetryPolicy::none())
        .get_run("thread_1", "run_404")
        .await
        .expect_err("must fail");
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn transient_failure_on_read_is_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/threads/thread_1/runs/run_1"))
        .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/threads/thread_1/runs/run_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "run_1",
            "thread_id": "thread_1",
            "status": "in_progress"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let run = service(&server, fast_retries(2))
        .get_run("thread_1", "run_1")
        .await
        .expect("retry succeeds");
    assert_eq!(run.status, RunStatus::InProgress);
}

#[tokio::test]
async fn gateway_timeout_on_create_run_is_not_resent() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/threads/thread_1/runs"))
        .respond_with(ResponseTemplate::new(504))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/threads/thread_1/runs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "run_2",
            "thread_id": "thread_1",
            "status": "queued"
        })))
        .expect(0)
        .mount(&server)
        .await;

    let err = service(&server, fast_retries(3))
        .create_run(
            "thread_1",
            &RunRequest {
                agent_id: "asst_1".to_string(),
                instructions: None,
                max_completion_tokens: None,
            },
        )
        .await
        .expect_err("not resent");
    assert!(matches!(err, ServiceError::Transport(_)));
}

#[tokio::test]
async fn server_error_on_post_message_is_not_resent() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/threads/thread_1/messages"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let err = service(&server, fast_retries(3))
        .create_message("thread_1", MessageRole::User, "hello")
        .await
        .expect_err("must fail");
    assert!(err.is_transient());
    assert!(!err.is_replay_safe());
}

#[tokio::test]
async fn rate_limited_post_is_resent_within_budget() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/threads"))
        .respond_with(ResponseTemplate::new(429))
        .expect(3)
        .mount(&server)
        .await;

    let err = service(&server, fast_retries(2))
        .create_thread(&HashMap::new())
        .await
        .expect_err("budget exhausted");
    assert!(matches!(err, ServiceError::RateLimited(_)));
}

#[tokio::test]
async fn unreachable_service_is_reported_as_such() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("binds");
    let address = listener.local_addr().expect("address");
    drop(listener);

    let config = HttpServiceConfig {
        retry: fast_retries(1),
        ..HttpServiceConfig::new(
            format!("http://{address}"),
            Credential::ApiKey("test-key".to_string()),
        )
    };
    let err = HttpAgentService::new(config)
        .expect("client builds")
        .create_thread(&HashMap::new())
        .await
        .expect_err("nothing listening");

    assert!(matches!(err, ServiceError::Unreachable(_)));
}

#[tokio::test]
async fn list_messages_requests_newest_first() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/threads/thread_1/messages"))
        .and(query_param("order", "desc"))
        .and(query_param("limit", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "data": [{
                "id": "msg_2",
                "role": "assistant",
                "content": [
                    {"type": "text", "text": {"value": "First part", "annotations": []}},
                    {"type": "image_file", "image_file": {"file_id": "file_1"}},
                    {"type": "text", "text": {"value": "Second part", "annotations": []}}
                ]
            }]
        })))
        .mount(&server)
        .await;

    let messages = service(&server, RetryPolicy::none())
        .list_messages("thread_1", ListOrder::Desc, 1)
        .await
        .expect("messages listed");

    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role, MessageRole::Assistant);
    assert_eq!(
        messages[0].content,
        vec![
            MessageContent::Text("First part".to_string()),
            MessageContent::Other("image_file".to_string()),
            MessageContent::Text("Second part".to_string()),
        ]
    );
}

#[tokio::test]
async fn bearer_token_is_sent_as_authorization() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/assistants/asst_1"))
        .and(header("authorization", "Bearer token-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "asst_1", "deleted": true})))
        .expect(1)
        .mount(&server)
        .await;

    let mut config =
        HttpServiceConfig::new(server.uri(), Credential::BearerToken("token-123".to_string()));
    config.retry = RetryPolicy::none();
    let service = HttpAgentService::new(config).expect("client builds");

    service.delete_agent("asst_1").await.expect("deleted");
}

#[cfg(feature = "sample-tools")]
#[tokio::test]
async fn create_agent_sends_tool_schemas() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/assistants"))
        .and(body_partial_json(json!({
            "model": "gpt-4o",
            "name": "support",
            "tools": [{"type": "function", "function": {"name": "calculate_cost"}}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "asst_7",
            "name": "support",
            "model": "gpt-4o"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let registry = hosted_agent_sdk::tools::catalog::sample_registry().expect("registers");
    let tools = registry
        .all_schemas()
        .into_iter()
        .filter(|tool| tool.function.name == "calculate_cost")
        .collect();

    let remote = service(&server, RetryPolicy::none())
        .create_agent(&hosted_agent_sdk::service::AgentDefinition {
            model: "gpt-4o".to_string(),
            name: "support".to_string(),
            instructions: "help".to_string(),
            tools,
            metadata: HashMap::new(),
        })
        .await
        .expect("agent created");
    assert_eq!(remote.id, "asst_7");
}
