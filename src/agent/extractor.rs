use tracing::debug;

use crate::error::ServiceError;
use crate::service::{AgentService, ListOrder, MessageContent, MessageRole};

/// Returned when the thread has no assistant reply on top.
pub const NO_RESPONSE: &str = "No response generated";

/// Text of the newest message on the thread, when that message is the
/// assistant's. Text segments are joined with newlines; other segments are
/// skipped.
pub async fn extract_latest_response(
    service: &dyn AgentService,
    thread_id: &str,
) -> Result<String, ServiceError> {
    let latest = service
        .list_messages(thread_id, ListOrder::Desc, 1)
        .await?
        .into_iter()
        .next();

    let Some(message) = latest.filter(|message| message.role == MessageRole::Assistant) else {
        debug!(thread_id, "no assistant reply on thread");
        return Ok(NO_RESPONSE.to_string());
    };

    let text = message
        .content
        .iter()
        .filter_map(|segment| match segment {
            MessageContent::Text(text) => Some(text.as_str()),
            MessageContent::Other(_) => None,
        })
        .collect::<Vec<_>>()
        .join("\n");

    Ok(text)
}
