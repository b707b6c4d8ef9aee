use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

use crate::agent::dispatcher::ToolDispatcher;
use crate::error::AgentError;
use crate::service::{AgentService, Run, RunStatus};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollConfig {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(300),
        }
    }
}

/// Terminal run plus what it took to get there.
#[derive(Clone, Debug, PartialEq)]
pub struct CompletedRun {
    pub run: Run,
    pub polls: u32,
    pub tool_calls: u64,
}

/// Drives one run to a terminal status, answering tool-call requests along
/// the way.
///
/// The first poll is always issued. Later polls are only issued while a full
/// interval still fits in the budget, so a run that never finishes sees
/// `max(1, floor(timeout / poll_interval))` polls before
/// [`AgentError::RunTimeout`]. The remote run is not cancelled on
/// timeout.
pub struct RunPoller<'a> {
    service: &'a dyn AgentService,
    dispatcher: &'a ToolDispatcher,
    config: PollConfig,
}

impl<'a> RunPoller<'a> {
    pub fn new(
        service: &'a dyn AgentService,
        dispatcher: &'a ToolDispatcher,
        config: PollConfig,
    ) -> Self {
        Self {
            service,
            dispatcher,
            config,
        }
    }

    pub async fn await_completion(
        &self,
        thread_id: &str,
        run_id: &str,
    ) -> Result<CompletedRun, AgentError> {
        let started = Instant::now();
        let mut polls = 0;
        let mut tool_calls = 0;
        let mut last_status: Option<RunStatus> = None;

        loop {
            if polls > 0 && started.elapsed() + self.config.poll_interval > self.config.timeout {
                warn!(run_id, polls, timeout = ?self.config.timeout, "run timed out");
                return Err(AgentError::RunTimeout {
                    run_id: run_id.to_string(),
                    timeout: self.config.timeout,
                });
            }

            let run = self.service.get_run(thread_id, run_id).await?;
            polls += 1;

            if last_status != Some(run.status) {
                debug!(run_id, status = %run.status, polls, "run status changed");
                last_status = Some(run.status);
            }

            if run.status.is_terminal() {
                return Ok(CompletedRun {
                    run,
                    polls,
                    tool_calls,
                });
            }

            if run.status == RunStatus::RequiresAction {
                match run.pending_tool_calls.as_deref() {
                    Some(batch) if !batch.is_empty() => {
                        let results = self
                            .dispatcher
                            .dispatch(self.service, thread_id, run_id, batch)
                            .await?;
                        tool_calls += results.len() as u64;
                    }
                    _ => warn!(run_id, "run requires action but carries no tool calls"),
                }
            }

            sleep(self.config.poll_interval).await;
        }
    }
}
