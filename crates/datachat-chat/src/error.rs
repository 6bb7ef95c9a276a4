//! Error types for the chat pipeline.

use datachat_core::error::DataChatError;

/// Errors from the chat pipeline.
///
/// Decode-local problems never appear here; they are reported through a
/// diagnostic sink and the affected payload is skipped.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("question cannot be empty")]
    EmptyQuestion,
    #[error("question exceeds maximum length of {0} characters")]
    QuestionTooLong(usize),
    #[error("invalid resource name: {0}")]
    InvalidResource(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("stream error: {0}")]
    Stream(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("{0}")]
    Core(String),
}

impl From<DataChatError> for ChatError {
    fn from(err: DataChatError) -> Self {
        ChatError::Core(err.to_string())
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        ChatError::Decode(err.to_string())
    }
}
