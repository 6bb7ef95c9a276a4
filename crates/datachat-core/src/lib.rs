//! Shared types, configuration and errors for the DataChat client.

pub mod config;
pub mod error;
pub mod types;

pub use config::{ConversationMode, DataChatConfig};
pub use error::{DataChatError, Result};
pub use types::*;
