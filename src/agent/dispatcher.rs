use std::sync::Arc;

use futures_util::future::join_all;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::error::{ServiceError, ToolError};
use crate::service::{AgentService, ToolCallRequest, ToolOutput};
use crate::tools::ToolRegistry;

#[derive(Clone, Debug, PartialEq)]
pub enum InvocationOutcome {
    Success(Value),
    Error(String),
}

/// Result of one tool invocation, correlated to its request by id.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolInvocationResult {
    pub tool_call_id: String,
    pub tool_name: String,
    pub outcome: InvocationOutcome,
}

impl ToolInvocationResult {
    pub fn is_error(&self) -> bool {
        matches!(self.outcome, InvocationOutcome::Error(_))
    }

    /// JSON-encoded payload submitted back to the run. Failures encode as
    /// `{"error": "<message>"}`.
    pub fn to_output(&self) -> ToolOutput {
        let output = match &self.outcome {
            InvocationOutcome::Success(value) => value.to_string(),
            InvocationOutcome::Error(message) => json!({ "error": message }).to_string(),
        };
        ToolOutput {
            tool_call_id: self.tool_call_id.clone(),
            output,
        }
    }
}

/// Resolves a run's pending tool calls against a [`ToolRegistry`] and hands
/// the outputs back to the service.
#[derive(Clone, Debug)]
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    concurrent: bool,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            concurrent: false,
        }
    }

    /// Execute the calls of one batch concurrently instead of in order.
    pub fn concurrent(mut self, concurrent: bool) -> Self {
        self.concurrent = concurrent;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Produces exactly one result per request. Never fails: every per-call
    /// problem becomes an [`InvocationOutcome::Error`].
    pub async fn resolve(&self, batch: &[ToolCallRequest]) -> Vec<ToolInvocationResult> {
        if self.concurrent {
            return join_all(batch.iter().map(|request| self.invoke(request))).await;
        }

        let mut results = Vec::with_capacity(batch.len());
        for request in batch {
            results.push(self.invoke(request).await);
        }
        results
    }

    /// Resolves `batch` and submits all outputs in a single call.
    ///
    /// Only the submission can fail; that error is returned as-is.
    pub async fn dispatch(
        &self,
        service: &dyn AgentService,
        thread_id: &str,
        run_id: &str,
        batch: &[ToolCallRequest],
    ) -> Result<Vec<ToolInvocationResult>, ServiceError> {
        let results = self.resolve(batch).await;
        let outputs = results
            .iter()
            .map(ToolInvocationResult::to_output)
            .collect::<Vec<_>>();

        let failed = results.iter().filter(|result| result.is_error()).count();
        info!(
            run_id,
            calls = results.len(),
            failed,
            "submitting tool outputs"
        );

        service
            .submit_tool_outputs(thread_id, run_id, &outputs)
            .await?;
        Ok(results)
    }

    async fn invoke(&self, request: &ToolCallRequest) -> ToolInvocationResult {
        info!(tool = %request.name, call_id = %request.id, "executing tool call");

        let outcome = match self.execute(request).await {
            Ok(value) => {
                debug!(call_id = %request.id, "tool call succeeded");
                InvocationOutcome::Success(value)
            }
            Err(err) => {
                warn!(tool = %request.name, call_id = %request.id, error = %err, "tool call failed");
                InvocationOutcome::Error(err.to_string())
            }
        };

        ToolInvocationResult {
            tool_call_id: request.id.clone(),
            tool_name: request.name.clone(),
            outcome,
        }
    }

    async fn execute(&self, request: &ToolCallRequest) -> Result<Value, ToolError> {
        let arguments = parse_arguments(&request.name, &request.arguments)?;
        self.registry.execute(&request.name, arguments).await
    }
}

/// Parses a JSON-encoded argument payload. Blank payloads mean "no arguments".
pub fn parse_arguments(tool: &str, raw: &str) -> Result<Value, ToolError> {
    if raw.trim().is_empty() {
        return Ok(json!({}));
    }
    serde_json::from_str(raw).map_err(|source| ToolError::MalformedArguments {
        tool: tool.to_string(),
        source,
    })
}
