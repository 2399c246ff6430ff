use gatito_llm::{ProviderMessage, RequestId, Role as ProviderRole};
use serde::{Deserialize, Serialize};

/// Chat speaker role. Serialized lowercase, matching the stored snapshot format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl From<Role> for ProviderRole {
    fn from(role: Role) -> Self {
        match role {
            Role::System => ProviderRole::System,
            Role::User => ProviderRole::User,
            Role::Assistant => ProviderRole::Assistant,
        }
    }
}

/// One immutable entry of the conversation timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn to_provider(&self) -> ProviderMessage {
        ProviderMessage::new(self.role.into(), self.content.clone())
    }
}

/// Ordered conversation context sent to the model.
///
/// The first entry is always the single system instruction. It is never part of
/// a snapshot and cannot be removed or duplicated through this API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct History {
    messages: Vec<Message>,
}

impl History {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(system_prompt)],
        }
    }

    /// Rebuilds a history from a stored snapshot. Stray system entries are dropped.
    pub fn from_snapshot(system_prompt: impl Into<String>, snapshot: Vec<Message>) -> Self {
        let mut history = Self::new(system_prompt);
        history.restore(snapshot);
        history
    }

    pub fn system(&self) -> &Message {
        &self.messages[0]
    }

    /// Every message, system instruction first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The conversational part: everything after the system instruction.
    pub fn conversation(&self) -> &[Message] {
        &self.messages[1..]
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// True when nothing besides the system instruction has been recorded.
    pub fn is_empty(&self) -> bool {
        self.messages.len() == 1
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(Message::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(Message::assistant(content));
    }

    /// Replaces the conversational part, keeping the system instruction.
    pub fn restore(&mut self, snapshot: Vec<Message>) {
        self.messages.truncate(1);
        self.messages.extend(
            snapshot
                .into_iter()
                .filter(|message| message.role != Role::System),
        );
    }

    pub fn snapshot(&self) -> Vec<Message> {
        self.conversation().to_vec()
    }

    pub fn to_provider_messages(&self) -> Vec<ProviderMessage> {
        self.messages.iter().map(Message::to_provider).collect()
    }
}

/// Per-session state threaded by `&mut` through the session controller and orchestrator.
#[derive(Debug, Clone)]
pub struct ChatContext {
    pub history: History,
    next_request_id: RequestId,
}

impl ChatContext {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            history: History::new(system_prompt),
            next_request_id: RequestId::new(1),
        }
    }

    /// Reserves a fresh id so events from an earlier request can never match.
    pub fn allocate_request_id(&mut self) -> RequestId {
        let id = self.next_request_id;
        self.next_request_id = id.next();
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_history_holds_only_the_system_instruction() {
        let history = History::new("be kind");

        assert_eq!(history.len(), 1);
        assert!(history.is_empty());
        assert_eq!(history.system(), &Message::system("be kind"));
        assert!(history.conversation().is_empty());
    }

    #[test]
    fn restore_keeps_single_system_prefix() {
        let mut history = History::new("be kind");
        history.push_user("stale");

        history.restore(vec![
            Message::system("injected"),
            Message::user("hola"),
            Message::assistant("hola!"),
        ]);

        assert_eq!(
            history.messages(),
            &[
                Message::system("be kind"),
                Message::user("hola"),
                Message::assistant("hola!"),
            ]
        );
        assert_eq!(
            history.snapshot(),
            vec![Message::user("hola"), Message::assistant("hola!")]
        );
    }

    #[test]
    fn provider_messages_include_system_first() {
        let mut history = History::new("be kind");
        history.push_user("hello");

        let provider_messages = history.to_provider_messages();

        assert_eq!(provider_messages.len(), 2);
        assert_eq!(provider_messages[0].role, ProviderRole::System);
        assert_eq!(provider_messages[1].role, ProviderRole::User);
        assert_eq!(provider_messages[1].content, "hello");
    }

    #[test]
    fn roles_serialize_lowercase() {
        let encoded = serde_json::to_string(&Message::assistant("hola!")).unwrap();
        assert_eq!(encoded, r#"{"role":"assistant","content":"hola!"}"#);
    }

    #[test]
    fn request_ids_are_never_reused() {
        let mut context = ChatContext::new("be kind");
        let first = context.allocate_request_id();
        let second = context.allocate_request_id();
        assert_ne!(first, second);
    }
}
