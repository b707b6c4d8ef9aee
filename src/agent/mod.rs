mod context;
mod dispatcher;
mod extractor;
mod poller;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::config::Settings;
use crate::error::{AgentError, ConfigError};
use crate::metrics::{MetricsSnapshot, RunMetrics};
use crate::service::{
    AgentDefinition, AgentService, MessageRole, RemoteAgent, RunRequest, RunStatus,
};
use crate::tools::ToolRegistry;

pub use context::{ContextEntry, ConversationContext, EntryRole};
pub use dispatcher::{InvocationOutcome, ToolDispatcher, ToolInvocationResult, parse_arguments};
pub use extractor::{NO_RESPONSE, extract_latest_response};
pub use poller::{CompletedRun, PollConfig, RunPoller};

pub const DEFAULT_INSTRUCTIONS: &str = "You are an enterprise assistant. Answer questions \
using the knowledge base, look up customer records, open support tickets, and estimate \
cloud costs with the tools you are given. Prefer tool results over guesses and say so when \
a tool fails.";

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub name: String,
    pub instructions: String,
    pub model: String,
    pub poll: PollConfig,
    pub max_completion_tokens: Option<u32>,
    pub max_conversation_history: usize,
    pub concurrent_tool_calls: bool,
    pub metadata: HashMap<String, String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "enterprise-assistant".to_string(),
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            model: "gpt-4o".to_string(),
            poll: PollConfig::default(),
            max_completion_tokens: None,
            max_conversation_history: 20,
            concurrent_tool_calls: false,
            metadata: HashMap::new(),
        }
    }
}

impl AgentConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            model: settings.deployment_name.clone(),
            poll: PollConfig {
                poll_interval: settings.poll_interval,
                timeout: settings.timeout,
            },
            max_completion_tokens: Some(settings.max_tokens),
            max_conversation_history: settings.max_conversation_history,
            ..Self::default()
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AgentStatus {
    Initializing,
    Ready,
    Running,
    Completed,
    Failed,
}

/// What a finished run produced.
#[derive(Clone, Debug, PartialEq)]
pub struct RunOutcome {
    pub run_id: String,
    pub status: RunStatus,
    pub response: String,
    pub duration: Duration,
    pub tokens_used: u64,
    pub tool_calls: u64,
    pub polls: u32,
    pub metrics: MetricsSnapshot,
}

pub struct AgentBuilder {
    service: Option<Arc<dyn AgentService>>,
    registry: Arc<ToolRegistry>,
    config: AgentConfig,
    metrics: Option<Arc<RunMetrics>>,
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self {
            service: None,
            registry: Arc::new(ToolRegistry::new()),
            config: AgentConfig::default(),
            metrics: None,
        }
    }
}

impl AgentBuilder {
    pub fn service<S>(mut self, service: S) -> Self
    where
        S: AgentService + 'static,
    {
        self.service = Some(Arc::new(service));
        self
    }

    pub fn shared_service(mut self, service: Arc<dyn AgentService>) -> Self {
        self.service = Some(service);
        self
    }

    pub fn tools(mut self, registry: ToolRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn shared_tools(mut self, registry: Arc<ToolRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn settings(mut self, settings: &Settings) -> Self {
        let name = std::mem::take(&mut self.config.name);
        let instructions = std::mem::take(&mut self.config.instructions);
        self.config = AgentConfig {
            name,
            instructions,
            ..AgentConfig::from_settings(settings)
        };
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.config.instructions = instructions.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.config.poll.poll_interval = poll_interval;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.poll.timeout = timeout;
        self
    }

    pub fn max_completion_tokens(mut self, max_tokens: u32) -> Self {
        self.config.max_completion_tokens = Some(max_tokens);
        self
    }

    pub fn concurrent_tool_calls(mut self, concurrent: bool) -> Self {
        self.config.concurrent_tool_calls = concurrent;
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.metadata.insert(key.into(), value.into());
        self
    }

    /// Shares one metrics aggregator across several agents.
    pub fn metrics(mut self, metrics: Arc<RunMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> Result<Agent, AgentError> {
        let Some(service) = self.service else {
            return Err(ConfigError::Missing("agent service").into());
        };

        let dispatcher =
            ToolDispatcher::new(self.registry).concurrent(self.config.concurrent_tool_calls);

        Ok(Agent {
            service,
            dispatcher,
            config: self.config,
            metrics: self.metrics.unwrap_or_default(),
            status: AgentStatus::Initializing,
            remote: None,
            threads: HashMap::new(),
        })
    }
}

/// One agent session against a hosted agent service.
///
/// Lifecycle: [`Agent::create`] registers the remote agent, threads and
/// messages are added, [`Agent::run`] drives runs to completion, and
/// [`Agent::cleanup`] deletes the remote agent again.
pub struct Agent {
    service: Arc<dyn AgentService>,
    dispatcher: ToolDispatcher,
    config: AgentConfig,
    metrics: Arc<RunMetrics>,
    status: AgentStatus,
    remote: Option<RemoteAgent>,
    threads: HashMap<String, ConversationContext>,
}

struct RunAttempt {
    run_id: String,
    status: RunStatus,
    response: String,
    tokens_used: u64,
    tool_calls: u64,
    polls: u32,
}

impl Agent {
    pub fn builder() -> AgentBuilder {
        AgentBuilder::default()
    }

    pub fn status(&self) -> AgentStatus {
        self.status
    }

    pub fn remote(&self) -> Option<&RemoteAgent> {
        self.remote.as_ref()
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn tools(&self) -> &ToolRegistry {
        self.dispatcher.registry()
    }

    pub fn conversation(&self, thread_id: &str) -> Option<&ConversationContext> {
        self.threads.get(thread_id)
    }

    /// Registers the agent and its tool schemas with the service.
    pub async fn create(&mut self) -> Result<&RemoteAgent, AgentError> {
        let definition = AgentDefinition {
            model: self.config.model.clone(),
            name: self.config.name.clone(),
            instructions: self.config.instructions.clone(),
            tools: self.tools().all_schemas(),
            metadata: self.config.metadata.clone(),
        };

        match self.service.create_agent(&definition).await {
            Ok(remote) => {
                info!(
                    agent_id = %remote.id,
                    tools = definition.tools.len(),
                    "created agent"
                );
                self.status = AgentStatus::Ready;
                Ok(&*self.remote.insert(remote))
            }
            Err(err) => {
                error!(error = %err, "failed to create agent");
                self.status = AgentStatus::Failed;
                Err(err.into())
            }
        }
    }

    pub async fn create_thread(
        &mut self,
        metadata: HashMap<String, String>,
    ) -> Result<String, AgentError> {
        let thread = self.service.create_thread(&metadata).await?;
        info!(thread_id = %thread.id, "created thread");

        let mut context = ConversationContext::new(thread.id.clone(), metadata);
        context.add_message(EntryRole::System, self.config.instructions.clone());
        self.threads.insert(thread.id.clone(), context);
        Ok(thread.id)
    }

    /// Posts a message to `thread_id` and returns its id.
    pub async fn add_message(
        &mut self,
        thread_id: &str,
        content: &str,
        role: MessageRole,
    ) -> Result<String, AgentError> {
        let message = self.service.create_message(thread_id, role, content).await?;
        debug!(thread_id, message_id = %message.id, role = role.as_str(), "added message");
        self.remember(thread_id, role.into(), content);
        Ok(message.id)
    }

    /// Starts a run on `thread_id` and waits for its outcome.
    ///
    /// Every started run is recorded in the metrics exactly once, successful
    /// or not.
    #[instrument(name = "agent_run", skip(self, instructions), fields(agent = %self.config.name))]
    pub async fn run(
        &mut self,
        thread_id: &str,
        instructions: Option<&str>,
    ) -> Result<RunOutcome, AgentError> {
        let Some(agent_id) = self.remote.as_ref().map(|remote| remote.id.clone()) else {
            return Err(AgentError::NotCreated);
        };

        self.status = AgentStatus::Running;
        let started = Instant::now();
        let attempt = self.attempt_run(&agent_id, thread_id, instructions).await;
        let duration = started.elapsed();

        match attempt {
            Ok(attempt) => {
                self.metrics
                    .record_run(true, duration, attempt.tokens_used, attempt.tool_calls);
                self.status = AgentStatus::Completed;
                if attempt.response != NO_RESPONSE {
                    self.remember(thread_id, EntryRole::Assistant, &attempt.response);
                }
                info!(
                    run_id = %attempt.run_id,
                    duration_secs = duration.as_secs_f64(),
                    tokens = attempt.tokens_used,
                    tool_calls = attempt.tool_calls,
                    "run completed"
                );

                Ok(RunOutcome {
                    run_id: attempt.run_id,
                    status: attempt.status,
                    response: attempt.response,
                    duration,
                    tokens_used: attempt.tokens_used,
                    tool_calls: attempt.tool_calls,
                    polls: attempt.polls,
                    metrics: self.metrics.snapshot(),
                })
            }
            Err(err) => {
                self.metrics.record_run(false, duration, 0, 0);
                self.status = AgentStatus::Failed;
                error!(error = %err, "run failed");
                Err(err)
            }
        }
    }

    /// Posts `content` and runs the thread once.
    pub async fn ask(&mut self, thread_id: &str, content: &str) -> Result<RunOutcome, AgentError> {
        self.add_message(thread_id, content, MessageRole::User).await?;
        self.run(thread_id, None).await
    }

    /// Deletes the remote agent and forgets local state. Best effort: a
    /// failed delete is logged, never returned.
    pub async fn cleanup(&mut self) {
        if let Some(remote) = self.remote.take() {
            match self.service.delete_agent(&remote.id).await {
                Ok(()) => info!(agent_id = %remote.id, "deleted agent"),
                Err(err) => warn!(agent_id = %remote.id, error = %err, "failed to delete agent"),
            }
        }
        self.threads.clear();
        self.status = AgentStatus::Initializing;
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    async fn attempt_run(
        &self,
        agent_id: &str,
        thread_id: &str,
        instructions: Option<&str>,
    ) -> Result<RunAttempt, AgentError> {
        let request = RunRequest {
            agent_id: agent_id.to_string(),
            instructions: instructions.map(str::to_string),
            max_completion_tokens: self.config.max_completion_tokens,
        };
        let run = self.service.create_run(thread_id, &request).await?;
        info!(run_id = %run.id, thread_id, "started run");

        let completed = RunPoller::new(self.service.as_ref(), &self.dispatcher, self.config.poll)
            .await_completion(thread_id, &run.id)
            .await?;

        if completed.run.status != RunStatus::Completed {
            return Err(AgentError::RunEnded {
                run_id: completed.run.id,
                status: completed.run.status,
                reason: completed.run.last_error,
            });
        }

        let response = extract_latest_response(self.service.as_ref(), thread_id).await?;

        Ok(RunAttempt {
            run_id: completed.run.id,
            status: completed.run.status,
            response,
            tokens_used: completed.run.usage.map_or(0, |usage| usage.total_tokens),
            tool_calls: completed.tool_calls,
            polls: completed.polls,
        })
    }

    fn remember(&mut self, thread_id: &str, role: EntryRole, content: &str) {
        let limit = self.config.max_conversation_history;
        if let Some(context) = self.threads.get_mut(thread_id) {
            context.add_message(role, content);
            context.truncate_history(limit);
        }
    }
}
