use std::collections::HashMap;
use std::error::Error;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use hosted_agent_sdk::service::{
    AgentDefinition, ListOrder, Message, MessageContent, MessageRole, RemoteAgent, Run, RunRequest,
    RunUsage, Thread, ToolCallRequest, ToolOutput,
};
use hosted_agent_sdk::tools::catalog::sample_registry;
use hosted_agent_sdk::{Agent, AgentService, RunStatus, ServiceError};
use serde_json::{Value, json};

/// Plays the hosted service: the first poll asks for a cost estimate, the
/// submitted output becomes the assistant's reply.
#[derive(Default)]
struct InMemoryService {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    status: Option<RunStatus>,
    messages: Vec<Message>,
}

impl InMemoryService {
    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("lock poisoned")
    }
}

fn run(status: RunStatus) -> Run {
    Run {
        id: "run_demo".to_string(),
        thread_id: "thread_demo".to_string(),
        status,
        pending_tool_calls: None,
        usage: None,
        last_error: None,
    }
}

#[async_trait]
impl AgentService for InMemoryService {
    async fn create_agent(&self, definition: &AgentDefinition) -> Result<RemoteAgent, ServiceError> {
        Ok(RemoteAgent {
            id: "asst_demo".to_string(),
            name: definition.name.clone(),
            model: definition.model.clone(),
        })
    }

    async fn delete_agent(&self, _agent_id: &str) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn create_thread(&self, _metadata: &HashMap<String, String>) -> Result<Thread, ServiceError> {
        Ok(Thread {
            id: "thread_demo".to_string(),
        })
    }

    async fn create_message(
        &self,
        _thread_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<Message, ServiceError> {
        let message = Message {
            id: format!("msg_{}", self.state().messages.len()),
            role,
            content: vec![MessageContent::Text(content.to_string())],
        };
        self.state().messages.push(message.clone());
        Ok(message)
    }

    async fn create_run(&self, _thread_id: &str, _request: &RunRequest) -> Result<Run, ServiceError> {
        self.state().status = Some(RunStatus::Queued);
        Ok(run(RunStatus::Queued))
    }

    async fn get_run(&self, _thread_id: &str, _run_id: &str) -> Result<Run, ServiceError> {
        let mut state = self.state();
        match state.status {
            Some(RunStatus::Queued) => {
                state.status = Some(RunStatus::RequiresAction);
                Ok(Run {
                    pending_tool_calls: Some(vec![ToolCallRequest {
                        id: "call_cost".to_string(),
                        name: "calculate_cost".to_string(),
                        arguments: json!({"resource_type": "vm", "tier": "standard"}).to_string(),
                    }]),
                    ..run(RunStatus::RequiresAction)
                })
            }
            Some(RunStatus::Completed) => Ok(Run {
                usage: Some(RunUsage {
                    prompt_tokens: 120,
                    completion_tokens: 40,
                    total_tokens: 160,
                }),
                ..run(RunStatus::Completed)
            }),
            Some(status) => Ok(run(status)),
            None => Err(ServiceError::NotFound("run_demo".to_string())),
        }
    }

    async fn submit_tool_outputs(
        &self,
        _thread_id: &str,
        _run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<Run, ServiceError> {
        let reply = outputs
            .iter()
            .map(|output| {
                let value: Value = serde_json::from_str(&output.output)
                    .map_err(|err| ServiceError::Request(err.to_string()))?;
                Ok(format!(
                    "A {} {} runs about ${} per month.",
                    value["tier"].as_str().unwrap_or("?"),
                    value["resource_type"].as_str().unwrap_or("?"),
                    value["estimated_monthly_cost"]
                ))
            })
            .collect::<Result<Vec<_>, ServiceError>>()?;

        let mut state = self.state();
        let id = format!("msg_{}", state.messages.len());
        state.messages.push(Message {
            id,
            role: MessageRole::Assistant,
            content: reply.into_iter().map(MessageContent::Text).collect(),
        });
        state.status = Some(RunStatus::Completed);
        Ok(run(RunStatus::InProgress))
    }

    async fn list_messages(
        &self,
        _thread_id: &str,
        order: ListOrder,
        limit: u32,
    ) -> Result<Vec<Message>, ServiceError> {
        let mut messages = self.state().messages.clone();
        if order == ListOrder::Desc {
            messages.reverse();
        }
        messages.truncate(limit as usize);
        Ok(messages)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let mut agent = Agent::builder()
        .service(InMemoryService::default())
        .tools(sample_registry()?)
        .poll_interval(Duration::from_millis(50))
        .timeout(Duration::from_secs(5))
        .build()?;

    agent.create().await?;
    let thread_id = agent.create_thread(HashMap::new()).await?;
    let outcome = agent
        .ask(&thread_id, "What does a standard VM cost per month?")
        .await?;

    println!("assistant: {}", outcome.response);
    println!(
        "polls={} tool_calls={} tokens={}",
        outcome.polls, outcome.tool_calls, outcome.tokens_used
    );
    println!("metrics: {}", serde_json::to_string(&agent.metrics())?);

    agent.cleanup().await;
    Ok(())
}
