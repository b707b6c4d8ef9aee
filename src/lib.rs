//! Client SDK for hosted, tool-calling agents.
//!
//! Surface:
//! - `Agent` session: create the remote agent, open threads, post messages,
//!   drive runs to completion and collect the reply
//! - `ToolRegistry` with schema declaration or signature inference and
//!   argument validation before dispatch
//! - `AgentService` seam plus `HttpAgentService`, an Assistants-style REST
//!   adapter with bounded retries
//! - `Settings` loaded from the environment and `RunMetrics` aggregation

pub mod agent;
pub mod config;
pub mod error;
pub mod metrics;
pub mod service;
pub mod tools;

pub use agent::{
    Agent, AgentBuilder, AgentConfig, AgentStatus, InvocationOutcome, NO_RESPONSE, PollConfig,
    RunOutcome, ToolDispatcher, ToolInvocationResult,
};
pub use config::Settings;
pub use error::{AgentError, BoxError, ConfigError, SchemaError, ServiceError, ToolError};
pub use metrics::{MetricsSnapshot, RunMetrics};
pub use service::{
    AgentService, Credential, HttpAgentService, HttpServiceConfig, RetryPolicy, RunStatus,
};
pub use tools::{ParamType, Signature, ToolArgs, ToolParameter, ToolRegistry, ToolSpec};
