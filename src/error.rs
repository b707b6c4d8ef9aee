use std::time::Duration;

use thiserror::Error;

use crate::service::RunStatus;

/// Boxed error returned by tool handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("tool name must not be empty")]
    EmptyToolName,
    #[error("duplicate parameter '{parameter}' declared for tool {tool}")]
    DuplicateParameter { tool: String, parameter: String },
    #[error("parameter '{parameter}' of tool {tool} has a default outside its enum")]
    DefaultOutsideEnum { tool: String, parameter: String },
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),
    #[error("tool already registered: {0}")]
    DuplicateTool(String),
    #[error("invalid tool arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },
    #[error("tool arguments for {tool} are not valid JSON: {source}")]
    MalformedArguments {
        tool: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("tool {tool} failed: {source}")]
    Execution {
        tool: String,
        #[source]
        source: BoxError,
    },
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("agent service rejected credentials: {0}")]
    Authentication(String),
    #[error("agent service transport failure: {0}")]
    Transport(String),
    /// The request never reached the service.
    #[error("agent service unreachable: {0}")]
    Unreachable(String),
    #[error("agent service rate limited the request: {0}")]
    RateLimited(String),
    #[error("agent service resource not found: {0}")]
    NotFound(String),
    #[error("agent service request rejected: {0}")]
    Request(String),
    #[error("agent service response invalid: {0}")]
    Response(String),
}

impl ServiceError {
    /// Whether a bounded retry may succeed where this attempt failed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ServiceError::Transport(_) | ServiceError::Unreachable(_) | ServiceError::RateLimited(_)
        )
    }

    /// Whether the service certainly did not act on the failed request, so
    /// resending a non-idempotent call cannot apply it twice.
    pub fn is_replay_safe(&self) -> bool {
        matches!(self, ServiceError::Unreachable(_) | ServiceError::RateLimited(_))
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
    #[error("no credential configured: set AGENT_SERVICE_API_KEY or AGENT_SERVICE_ACCESS_TOKEN")]
    MissingCredential,
    #[error("failed to build http client: {0}")]
    HttpClient(String),
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("run {run_id} did not finish within {timeout:?}")]
    RunTimeout { run_id: String, timeout: Duration },
    #[error("run {run_id} ended with status {status}{}", reason.as_deref().map(|r| format!(": {r}")).unwrap_or_default())]
    RunEnded {
        run_id: String,
        status: RunStatus,
        reason: Option<String>,
    },
    #[error("agent has not been created; call Agent::create first")]
    NotCreated,
}
