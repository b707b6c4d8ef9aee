use std::collections::HashMap;

use crate::service::MessageRole;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryRole {
    System,
    User,
    Assistant,
}

impl From<MessageRole> for EntryRole {
    fn from(role: MessageRole) -> Self {
        match role {
            MessageRole::User => EntryRole::User,
            MessageRole::Assistant => EntryRole::Assistant,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContextEntry {
    pub role: EntryRole,
    pub content: String,
}

/// Local record of one thread as this session has seen it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversationContext {
    thread_id: String,
    metadata: HashMap<String, String>,
    entries: Vec<ContextEntry>,
}

impl ConversationContext {
    pub fn new(thread_id: impl Into<String>, metadata: HashMap<String, String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            metadata,
            entries: Vec::new(),
        }
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }

    pub fn entries(&self) -> &[ContextEntry] {
        &self.entries
    }

    pub fn message_count(&self) -> usize {
        self.entries.len()
    }

    pub fn add_message(&mut self, role: EntryRole, content: impl Into<String>) {
        self.entries.push(ContextEntry {
            role,
            content: content.into(),
        });
    }

    /// Drops the oldest entries beyond `max_messages`. A leading system entry
    /// survives and counts toward the limit.
    pub fn truncate_history(&mut self, max_messages: usize) {
        if self.entries.len() <= max_messages {
            return;
        }

        let keeps_system = self
            .entries
            .first()
            .is_some_and(|entry| entry.role == EntryRole::System)
            && max_messages > 0;

        let (start, keep_recent) = if keeps_system {
            (1, max_messages - 1)
        } else {
            (0, max_messages)
        };
        let drop_until = self.entries.len() - keep_recent;
        self.entries.drain(start..drop_until);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context_with(roles: &[EntryRole]) -> ConversationContext {
        let mut context = ConversationContext::new("thread", HashMap::new());
        for (index, role) in roles.iter().enumerate() {
            context.add_message(*role, format!("m{index}"));
        }
        context
    }

    fn contents(context: &ConversationContext) -> Vec<&str> {
        context.entries().iter().map(|entry| entry.content.as_str()).collect()
    }

    #[test]
    fn truncation_keeps_leading_system_entry() {
        let mut context = context_with(&[
            EntryRole::System,
            EntryRole::User,
            EntryRole::Assistant,
            EntryRole::User,
            EntryRole::Assistant,
        ]);
        context.truncate_history(3);
        assert_eq!(contents(&context), vec!["m0", "m3", "m4"]);
    }

    #[test]
    fn truncation_keeps_most_recent_without_system() {
        let mut context = context_with(&[EntryRole::User, EntryRole::Assistant, EntryRole::User]);
        context.truncate_history(2);
        assert_eq!(contents(&context), vec!["m1", "m2"]);
    }

    #[test]
    fn truncation_is_noop_under_limit() {
        let mut context = context_with(&[EntryRole::User]);
        context.truncate_history(5);
        assert_eq!(context.message_count(), 1);
    }
}
