use std::collections::HashMap;
use std::env;
use std::error::Error;

use hosted_agent_sdk::tools::catalog::sample_registry;
use hosted_agent_sdk::{Agent, AgentError, HttpAgentService, RunOutcome, Settings};
use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let settings = Settings::from_env()?;
    init_tracing(settings.log_level);

    let prompt = env::args().skip(1).collect::<Vec<_>>().join(" ");
    let prompt = if prompt.trim().is_empty() {
        "What would a standard VM cost for a full month?".to_string()
    } else {
        prompt
    };

    let service = HttpAgentService::from_settings(&settings)?;
    let mut agent = Agent::builder()
        .service(service)
        .tools(sample_registry()?)
        .settings(&settings)
        .metadata("client", "agent_chat")
        .build()?;

    let remote = agent.create().await?;
    println!("agent: {} ({})", remote.id, remote.model);

    let result = converse(&mut agent, &prompt).await;
    agent.cleanup().await;
    let outcome = result?;

    println!(
        "run {} {} in {:.1}s, {} tokens, {} tool calls",
        outcome.run_id,
        outcome.status,
        outcome.duration.as_secs_f64(),
        outcome.tokens_used,
        outcome.tool_calls
    );
    println!("\nassistant:\n{}", outcome.response);
    println!(
        "\nmetrics:\n{}",
        serde_json::to_string_pretty(&outcome.metrics)?
    );

    Ok(())
}

async fn converse(agent: &mut Agent, prompt: &str) -> Result<RunOutcome, AgentError> {
    let thread_id = agent.create_thread(HashMap::new()).await?;
    println!("thread: {thread_id}");
    agent.ask(&thread_id, prompt).await
}

fn init_tracing(level: Level) {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .init();
}
