//! Chat request construction.
//!
//! Builds the backend's chat request for either conversation mode and the
//! resource names it refers to. Nothing here talks to the network.

use serde::Serialize;
use uuid::Uuid;

use datachat_core::types::{DisplayMessage, Role};
use datachat_core::{ConversationMode, DataChatConfig};

use crate::error::ChatError;

/// Maximum question length in characters.
pub const MAX_QUESTION_LENGTH: usize = 4000;

// =============================================================================
// Resource names
// =============================================================================

/// `projects/{project}/locations/{location}`.
pub fn parent_resource(project_id: &str, location: &str) -> Result<String, ChatError> {
    Ok(format!(
        "projects/{}/locations/{}",
        resource_id(project_id, "project")?,
        resource_id(location, "location")?
    ))
}

/// `{parent}/dataAgents/{agent_id}`.
pub fn agent_resource(parent: &str, agent_id: &str) -> Result<String, ChatError> {
    Ok(format!("{parent}/dataAgents/{}", resource_id(agent_id, "agent")?))
}

/// `{parent}/conversations/{conversation_id}`.
pub fn conversation_resource(parent: &str, conversation_id: &str) -> Result<String, ChatError> {
    Ok(format!(
        "{parent}/conversations/{}",
        resource_id(conversation_id, "conversation")?
    ))
}

/// A fresh conversation id: `conv_` and twelve hex digits.
pub fn new_conversation_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("conv_{}", &hex[..12])
}

/// A single path segment: non-empty and free of `/`.
fn resource_id<'a>(id: &'a str, what: &str) -> Result<&'a str, ChatError> {
    let id = id.trim();
    if id.is_empty() || id.contains('/') {
        return Err(ChatError::InvalidResource(format!("{what} id '{id}'")));
    }
    Ok(id)
}

// =============================================================================
// Validation
// =============================================================================

/// Check a question before it is sent. Returns it trimmed.
pub fn validate_question(question: &str) -> Result<&str, ChatError> {
    let trimmed = question.trim();
    if trimmed.is_empty() {
        return Err(ChatError::EmptyQuestion);
    }
    if trimmed.chars().count() > MAX_QUESTION_LENGTH {
        return Err(ChatError::QuestionTooLong(MAX_QUESTION_LENGTH));
    }
    Ok(trimmed)
}

// =============================================================================
// Wire types
// =============================================================================

/// A chat request in the backend's JSON form.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub parent: String,
    pub messages: Vec<RequestMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_reference: Option<ConversationReference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_agent_context: Option<DataAgentContext>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMessage {
    pub user_message: RequestUserMessage,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RequestUserMessage {
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationReference {
    pub conversation: String,
    pub data_agent_context: DataAgentContext,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataAgentContext {
    pub data_agent: String,
}

impl RequestMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            user_message: RequestUserMessage { text: text.into() },
        }
    }
}

impl ChatRequest {
    /// A turn in a backend-held conversation.
    ///
    /// The reference carries the agent as well as the conversation; the
    /// backend rejects a conversation-only reference.
    pub fn stateful(
        parent: &str,
        conversation: &str,
        agent: &str,
        question: &str,
    ) -> Result<Self, ChatError> {
        let question = validate_question(question)?;
        Ok(Self {
            parent: parent.to_string(),
            messages: vec![RequestMessage::user(question)],
            conversation_reference: Some(ConversationReference {
                conversation: conversation.to_string(),
                data_agent_context: DataAgentContext {
                    data_agent: agent.to_string(),
                },
            }),
            data_agent_context: None,
        })
    }

    /// A self-contained turn that resends the prior user questions.
    ///
    /// Only the `max_history` most recent history messages are considered,
    /// and of those only the user's. The backend regenerates its own side.
    pub fn stateless(
        parent: &str,
        agent: &str,
        history: &[DisplayMessage],
        max_history: usize,
        question: &str,
    ) -> Result<Self, ChatError> {
        let question = validate_question(question)?;
        let recent = &history[history.len().saturating_sub(max_history)..];
        let mut messages: Vec<RequestMessage> = recent
            .iter()
            .filter(|m| m.role == Role::User && !m.content.trim().is_empty())
            .map(|m| RequestMessage::user(m.content.clone()))
            .collect();
        messages.push(RequestMessage::user(question));

        Ok(Self {
            parent: parent.to_string(),
            messages,
            conversation_reference: None,
            data_agent_context: Some(DataAgentContext {
                data_agent: agent.to_string(),
            }),
        })
    }

    /// Build the request the configuration calls for.
    ///
    /// In stateful mode `conversation_id` (or the configured default) names
    /// the conversation; a new id is generated when neither is set.
    pub fn from_config(
        config: &DataChatConfig,
        conversation_id: Option<&str>,
        history: &[DisplayMessage],
        question: &str,
    ) -> Result<Self, ChatError> {
        config.ensure_valid()?;
        let parent = parent_resource(&config.cloud.project_id, &config.cloud.location)?;
        let agent = agent_resource(&parent, &config.agent.default_agent_id)?;

        match config.agent.conversation_mode {
            ConversationMode::Stateful => {
                let id = conversation_id
                    .map(str::to_string)
                    .or_else(|| config.agent.default_conversation_id.clone())
                    .unwrap_or_else(new_conversation_id);
                let conversation = conversation_resource(&parent, &id)?;
                Self::stateful(&parent, &conversation, &agent, question)
            }
            ConversationMode::Stateless => Self::stateless(
                &parent,
                &agent,
                history,
                config.display.max_message_history,
                question,
            ),
        }
    }

    /// The question this request asks.
    pub fn question(&self) -> Option<&str> {
        self.messages.last().map(|m| m.user_message.text.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PARENT: &str = "projects/acme/locations/global";
    const AGENT: &str = "projects/acme/locations/global/dataAgents/sales";

    fn make_history() -> Vec<DisplayMessage> {
        vec![
            DisplayMessage::user("first question"),
            DisplayMessage::text("first answer"),
            DisplayMessage::user("second question"),
            DisplayMessage::sql("SELECT 2"),
        ]
    }

    fn make_config(mode: ConversationMode) -> DataChatConfig {
        let mut config = DataChatConfig::default();
        config.cloud.project_id = "acme".to_string();
        config.agent.default_agent_id = "sales".to_string();
        config.agent.conversation_mode = mode;
        config
    }

    // ---- Resource names ----

    #[test]
    fn test_resource_names() {
        let parent = parent_resource("acme", "us-central1").unwrap();
        assert_eq!(parent, "projects/acme/locations/us-central1");
        assert_eq!(
            agent_resource(&parent, "sales").unwrap(),
            "projects/acme/locations/us-central1/dataAgents/sales"
        );
        assert_eq!(
            conversation_resource(&parent, "conv_1").unwrap(),
            "projects/acme/locations/us-central1/conversations/conv_1"
        );
    }

    #[test]
    fn test_invalid_resource_ids() {
        assert!(matches!(parent_resource("", "global"), Err(ChatError::InvalidResource(_))));
        assert!(matches!(agent_resource(PARENT, "a/b"), Err(ChatError::InvalidResource(_))));
        assert!(matches!(conversation_resource(PARENT, "  "), Err(ChatError::InvalidResource(_))));
    }

    #[test]
    fn test_new_conversation_id_shape() {
        let id = new_conversation_id();
        assert!(id.starts_with("conv_"));
        let hex = &id["conv_".len()..];
        assert_eq!(hex.len(), 12);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(new_conversation_id(), id);
    }

    // ---- Validation ----

    #[test]
    fn test_validate_question() {
        assert_eq!(validate_question("  top sellers?  ").unwrap(), "top sellers?");
        assert!(matches!(validate_question(""), Err(ChatError::EmptyQuestion)));
        assert!(matches!(validate_question(" \n\t"), Err(ChatError::EmptyQuestion)));
        let long = "q".repeat(MAX_QUESTION_LENGTH + 1);
        assert!(matches!(validate_question(&long), Err(ChatError::QuestionTooLong(4000))));
        let exact = "é".repeat(MAX_QUESTION_LENGTH);
        assert!(validate_question(&exact).is_ok());
    }

    // ---- Stateful ----

    #[test]
    fn test_stateful_request_carries_agent_context() {
        let conversation = format!("{PARENT}/conversations/conv_abc");
        let request = ChatRequest::stateful(PARENT, &conversation, AGENT, "how many orders?").unwrap();
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "parent": PARENT,
                "messages": [{"userMessage": {"text": "how many orders?"}}],
                "conversationReference": {
                    "conversation": conversation,
                    "dataAgentContext": {"dataAgent": AGENT}
                }
            })
        );
    }

    #[test]
    fn test_stateful_rejects_empty_question() {
        assert!(matches!(
            ChatRequest::stateful(PARENT, "c", AGENT, "   "),
            Err(ChatError::EmptyQuestion)
        ));
    }

    // ---- Stateless ----

    #[test]
    fn test_stateless_resends_user_turns_only() {
        let request = ChatRequest::stateless(PARENT, AGENT, &make_history(), 50, "third question").unwrap();
        let texts: Vec<&str> = request
            .messages
            .iter()
            .map(|m| m.user_message.text.as_str())
            .collect();
        assert_eq!(texts, vec!["first question", "second question", "third question"]);
        assert!(request.conversation_reference.is_none());
        assert_eq!(request.data_agent_context.as_ref().unwrap().data_agent, AGENT);
        assert_eq!(request.question(), Some("third question"));
    }

    #[test]
    fn test_stateless_history_limit() {
        let request = ChatRequest::stateless(PARENT, AGENT, &make_history(), 2, "next").unwrap();
        let texts: Vec<&str> = request
            .messages
            .iter()
            .map(|m| m.user_message.text.as_str())
            .collect();
        assert_eq!(texts, vec!["second question", "next"]);

        let request = ChatRequest::stateless(PARENT, AGENT, &make_history(), 0, "alone").unwrap();
        assert_eq!(request.messages.len(), 1);
    }

    #[test]
    fn test_stateless_wire_form() {
        let request = ChatRequest::stateless(PARENT, AGENT, &[], 50, "q").unwrap();
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["dataAgentContext"]["dataAgent"], AGENT);
        assert!(value.get("conversationReference").is_none());
    }

    // ---- From config ----

    #[test]
    fn test_from_config_stateful_uses_given_conversation() {
        let config = make_config(ConversationMode::Stateful);
        let request = ChatRequest::from_config(&config, Some("conv_given"), &[], "q").unwrap();
        let reference = request.conversation_reference.unwrap();
        assert_eq!(reference.conversation, format!("{PARENT}/conversations/conv_given"));
        assert_eq!(reference.data_agent_context.data_agent, AGENT);
    }

    #[test]
    fn test_from_config_stateful_generates_conversation() {
        let config = make_config(ConversationMode::Stateful);
        let request = ChatRequest::from_config(&config, None, &[], "q").unwrap();
        let reference = request.conversation_reference.unwrap();
        assert!(reference
            .conversation
            .starts_with(&format!("{PARENT}/conversations/conv_")));
    }

    #[test]
    fn test_from_config_stateless() {
        let mut config = make_config(ConversationMode::Stateless);
        config.display.max_message_history = 1;
        let history = vec![DisplayMessage::user("old"), DisplayMessage::user("recent")];
        let request = ChatRequest::from_config(&config, None, &history, "new").unwrap();
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].user_message.text, "recent");
    }

    #[test]
    fn test_from_config_requires_project() {
        let config = DataChatConfig::default();
        let err = ChatRequest::from_config(&config, None, &[], "q").unwrap_err();
        assert!(matches!(err, ChatError::Core(_)));
        assert!(err.to_string().contains("DATACHAT_PROJECT_ID"));
    }
}
