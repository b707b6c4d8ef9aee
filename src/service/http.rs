use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::Settings;
use crate::error::{ConfigError, ServiceError};
use crate::service::{
    AgentDefinition, AgentService, ListOrder, Message, MessageContent, MessageRole, RemoteAgent,
    RetryPolicy, Run, RunRequest, RunStatus, RunUsage, Thread, ToolCallRequest, ToolOutput,
};
use crate::tools::ToolDefinition;

const DEFAULT_API_VERSION: &str = "2024-07-01-preview";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub enum Credential {
    /// Sent as the `api-key` header.
    ApiKey(String),
    /// Sent as `Authorization: Bearer <token>`.
    BearerToken(String),
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::ApiKey(_) => f.write_str("ApiKey(<redacted>)"),
            Credential::BearerToken(_) => f.write_str("BearerToken(<redacted>)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpServiceConfig {
    pub endpoint: String,
    pub api_version: String,
    pub credential: Credential,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

impl HttpServiceConfig {
    pub fn new(endpoint: impl Into<String>, credential: Credential) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_version: DEFAULT_API_VERSION.to_string(),
            credential,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

/// [`AgentService`] over the Assistants-style REST surface.
#[derive(Debug, Clone)]
pub struct HttpAgentService {
    client: Client,
    config: HttpServiceConfig,
}

impl HttpAgentService {
    pub fn new(config: HttpServiceConfig) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| ServiceError::Request(err.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        let config = HttpServiceConfig {
            endpoint: settings.endpoint.clone(),
            api_version: settings.api_version.clone(),
            credential: settings.credential.clone(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry: RetryPolicy::new(settings.max_retries),
        };
        Self::new(config).map_err(|err| ConfigError::HttpClient(err.to_string()))
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.config.endpoint.trim_end_matches('/'))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.credential {
            Credential::ApiKey(key) => request.header("api-key", key),
            Credential::BearerToken(token) => request.bearer_auth(token),
        }
    }

    async fn call<B, T>(
        &self,
        operation: &'static str,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> Result<T, ServiceError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned + Send,
    {
        self.config
            .retry
            .run_if(operation, replay_rule(&method), || {
                let method = method.clone();
                async move {
                    let response = self.send(method, path, query, body).await?;
                    response
                        .json::<T>()
                        .await
                        .map_err(|err| ServiceError::Response(format!("{operation}: {err}")))
                }
            })
            .await
    }

    async fn call_no_content(
        &self,
        operation: &'static str,
        method: Method,
        path: &str,
    ) -> Result<(), ServiceError> {
        self.config
            .retry
            .run_if(operation, replay_rule(&method), || {
                let method = method.clone();
                async move {
                    self.send::<Value>(method, path, &[], None).await?;
                    Ok(())
                }
            })
            .await
    }

    async fn send<B>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> Result<reqwest::Response, ServiceError>
    where
        B: Serialize + ?Sized + Sync,
    {
        debug!(%method, path, "agent service request");

        let mut request = self
            .client
            .request(method, self.url(path))
            .query(&[("api-version", self.config.api_version.as_str())])
            .query(query);
        request = self.authorize(request);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|err| {
            if err.is_connect() {
                ServiceError::Unreachable(err.to_string())
            } else {
                ServiceError::Transport(err.to_string())
            }
        })?;

        if response.status().is_success() {
            Ok(response)
        } else {
            Err(extract_api_error(response).await)
        }
    }
}

/// Idempotent methods retry every transient failure. Anything else, such as
/// starting a run or posting a message, is only resent when the service
/// cannot have acted on it.
fn replay_rule(method: &Method) -> fn(&ServiceError) -> bool {
    if method.is_idempotent() {
        ServiceError::is_transient
    } else {
        ServiceError::is_replay_safe
    }
}

#[async_trait]
impl AgentService for HttpAgentService {
    async fn create_agent(&self, definition: &AgentDefinition) -> Result<RemoteAgent, ServiceError> {
        let body = CreateAgentBody {
            model: &definition.model,
            name: &definition.name,
            instructions: &definition.instructions,
            tools: &definition.tools,
            metadata: &definition.metadata,
        };
        let agent: WireAgent = self
            .call("create_agent", Method::POST, "assistants", &[], Some(&body))
            .await?;

        Ok(RemoteAgent {
            id: agent.id,
            name: agent.name.unwrap_or_else(|| definition.name.clone()),
            model: agent.model.unwrap_or_else(|| definition.model.clone()),
        })
    }

    async fn delete_agent(&self, agent_id: &str) -> Result<(), ServiceError> {
        self.call_no_content(
            "delete_agent",
            Method::DELETE,
            &format!("assistants/{agent_id}"),
        )
        .await
    }

    async fn create_thread(
        &self,
        metadata: &HashMap<String, String>,
    ) -> Result<Thread, ServiceError> {
        let body = CreateThreadBody { metadata };
        let thread: WireThread = self
            .call("create_thread", Method::POST, "threads", &[], Some(&body))
            .await?;
        Ok(Thread { id: thread.id })
    }

    async fn create_message(
        &self,
        thread_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<Message, ServiceError> {
        let body = CreateMessageBody { role, content };
        let message: WireMessage = self
            .call(
                "create_message",
                Method::POST,
                &format!("threads/{thread_id}/messages"),
                &[],
                Some(&body),
            )
            .await?;
        Ok(normalize_message(message))
    }

    async fn create_run(&self, thread_id: &str, request: &RunRequest) -> Result<Run, ServiceError> {
        let body = CreateRunBody {
            assistant_id: &request.agent_id,
            instructions: request.instructions.as_deref(),
            max_completion_tokens: request.max_completion_tokens,
        };
        let run: WireRun = self
            .call(
                "create_run",
                Method::POST,
                &format!("threads/{thread_id}/runs"),
                &[],
                Some(&body),
            )
            .await?;
        Ok(normalize_run(run))
    }

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run, ServiceError> {
        let run: WireRun = self
            .call::<Value, _>(
                "get_run",
                Method::GET,
                &format!("threads/{thread_id}/runs/{run_id}"),
                &[],
                None,
            )
            .await?;
        Ok(normalize_run(run))
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<Run, ServiceError> {
        let body = SubmitToolOutputsBody {
            tool_outputs: outputs
                .iter()
                .map(|output| WireToolOutput {
                    tool_call_id: &output.tool_call_id,
                    output: &output.output,
                })
                .collect(),
        };
        let run: WireRun = self
            .call(
                "submit_tool_outputs",
                Method::POST,
                &format!("threads/{thread_id}/runs/{run_id}/submit_tool_outputs"),
                &[],
                Some(&body),
            )
            .await?;
        Ok(normalize_run(run))
    }

    async fn list_messages(
        &self,
        thread_id: &str,
        order: ListOrder,
        limit: u32,
    ) -> Result<Vec<Message>, ServiceError> {
        let query = [
            ("order", order.as_str().to_string()),
            ("limit", limit.to_string()),
        ];
        let page: WireMessageList = self
            .call::<Value, _>(
                "list_messages",
                Method::GET,
                &format!("threads/{thread_id}/messages"),
                &query,
                None,
            )
            .await?;
        Ok(page.data.into_iter().map(normalize_message).collect())
    }
}

#[derive(Debug, Serialize)]
struct CreateAgentBody<'a> {
    model: &'a str,
    name: &'a str,
    instructions: &'a str,
    tools: &'a [ToolDefinition],
    metadata: &'a HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct WireAgent {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateThreadBody<'a> {
    metadata: &'a HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct WireThread {
    id: String,
}

#[derive(Debug, Serialize)]
struct CreateMessageBody<'a> {
    role: MessageRole,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct WireMessageList {
    #[serde(default)]
    data: Vec<WireMessage>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    id: String,
    role: MessageRole,
    #[serde(default)]
    content: Vec<WireContent>,
}

#[derive(Debug, Deserialize)]
struct WireContent {
    #[serde(rename = "type")]
    type_: String,
    #[serde(default)]
    text: Option<WireText>,
}

#[derive(Debug, Deserialize)]
struct WireText {
    value: String,
}

#[derive(Debug, Serialize)]
struct CreateRunBody<'a> {
    assistant_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct WireRun {
    id: String,
    thread_id: String,
    status: RunStatus,
    #[serde(default)]
    required_action: Option<WireRequiredAction>,
    #[serde(default)]
    usage: Option<WireUsage>,
    #[serde(default)]
    last_error: Option<WireRunError>,
}

#[derive(Debug, Deserialize)]
struct WireRequiredAction {
    #[serde(default)]
    submit_tool_outputs: Option<WireSubmitToolOutputs>,
}

#[derive(Debug, Deserialize)]
struct WireSubmitToolOutputs {
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunctionCall,
}

#[derive(Debug, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct WireRunError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Serialize)]
struct SubmitToolOutputsBody<'a> {
    tool_outputs: Vec<WireToolOutput<'a>>,
}

#[derive(Debug, Serialize)]
struct WireToolOutput<'a> {
    tool_call_id: &'a str,
    output: &'a str,
}

#[derive(Debug, Deserialize)]
struct WireErrorEnvelope {
    error: WireApiError,
}

#[derive(Debug, Deserialize)]
struct WireApiError {
    #[serde(default)]
    code: Option<Value>,
    #[serde(default)]
    message: Option<String>,
}

fn normalize_run(run: WireRun) -> Run {
    let pending_tool_calls = run
        .required_action
        .and_then(|action| action.submit_tool_outputs)
        .map(|submit| {
            submit
                .tool_calls
                .into_iter()
                .map(|call| ToolCallRequest {
                    id: call.id,
                    name: call.function.name,
                    arguments: call.function.arguments,
                })
                .collect()
        });

    Run {
        id: run.id,
        thread_id: run.thread_id,
        status: run.status,
        pending_tool_calls,
        usage: run.usage.map(|usage| RunUsage {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }),
        last_error: run.last_error.map(|error| match (error.code, error.message) {
            (Some(code), Some(message)) => format!("{code}: {message}"),
            (None, Some(message)) => message,
            (Some(code), None) => code,
            (None, None) => "unknown run error".to_string(),
        }),
    }
}

fn normalize_message(message: WireMessage) -> Message {
    Message {
        id: message.id,
        role: message.role,
        content: message
            .content
            .into_iter()
            .map(|segment| match segment.text {
                Some(text) if segment.type_ == "text" => MessageContent::Text(text.value),
                _ => MessageContent::Other(segment.type_),
            })
            .collect(),
    }
}

async fn extract_api_error(response: reqwest::Response) -> ServiceError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    let detail = match serde_json::from_str::<WireErrorEnvelope>(&body) {
        Ok(parsed) => {
            let code = parsed
                .error
                .code
                .map(|value| match value {
                    Value::String(value) => value,
                    other => other.to_string(),
                })
                .unwrap_or_else(|| status.as_u16().to_string());
            let message = parsed
                .error
                .message
                .unwrap_or_else(|| "unknown agent service error".to_string());
            format!("{status} {code}: {message}")
        }
        Err(_) if body.is_empty() => status.to_string(),
        Err(_) => format!("{status}: {body}"),
    };

    classify_status(status, detail)
}

fn classify_status(status: StatusCode, detail: String) -> ServiceError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ServiceError::Authentication(detail),
        StatusCode::NOT_FOUND => ServiceError::NotFound(detail),
        StatusCode::TOO_MANY_REQUESTS => ServiceError::RateLimited(detail),
        StatusCode::REQUEST_TIMEOUT => ServiceError::Transport(detail),
        status if status.is_server_error() => ServiceError::Transport(detail),
        _ => ServiceError::Request(detail),
    }
}
