//! Stream handler: drives a whole backend response through the parser.
//!
//! Consumption is pull-based and strictly ordered. Each protocol message is
//! fully parsed before the next one is requested. The first stream failure
//! becomes a single error message and ends the turn.

use std::fmt::Display;
use std::sync::Arc;

use datachat_core::types::DisplayMessage;

use crate::diagnostics::DiagnosticSink;
use crate::error::ChatError;
use crate::parser::MessageParser;
use crate::protocol::ProtocolMessage;
use crate::request::ChatRequest;

const COMPONENT: &str = "handler";

/// Source of backend response streams.
///
/// Implementations own the network resources; dropping the returned
/// iterator must release them.
pub trait ChatTransport {
    type Stream: Iterator<Item = Result<ProtocolMessage, ChatError>>;

    /// Send `request` and return its response stream.
    fn open(&self, request: &ChatRequest) -> Result<Self::Stream, ChatError>;
}

/// Turns backend response streams into display messages.
#[derive(Clone, Default)]
pub struct ChatHandler {
    parser: MessageParser,
}

impl ChatHandler {
    pub fn new(sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            parser: MessageParser::new(sink),
        }
    }

    pub fn parser(&self) -> &MessageParser {
        &self.parser
    }

    /// Parse every message of `stream`, in order.
    ///
    /// On the first `Err` one error message (`"Error: <failure>"`) is
    /// appended and the rest of the stream is not consumed.
    pub fn process_stream<I, E>(&self, stream: I) -> Vec<DisplayMessage>
    where
        I: IntoIterator<Item = Result<ProtocolMessage, E>>,
        E: Display,
    {
        let sink = self.parser.sink();
        let mut messages = Vec::new();

        for item in stream {
            match item {
                Ok(message) => messages.extend(self.parser.parse(&message)),
                Err(e) => {
                    sink.warn(COMPONENT, format!("Chat error: {e}"));
                    messages.push(stream_failure(&e));
                    break;
                }
            }
        }

        sink.info(
            COMPONENT,
            format!("Received {} messages in response", messages.len()),
        );
        messages
    }

    /// Send `request` through `transport` and process the response.
    ///
    /// A failure to open the stream is reported like a stream failure.
    pub fn ask<T: ChatTransport>(&self, transport: &T, request: &ChatRequest) -> Vec<DisplayMessage> {
        match transport.open(request) {
            Ok(stream) => self.process_stream(stream),
            Err(e) => {
                self.parser
                    .sink()
                    .warn(COMPONENT, format!("Chat error: {e}"));
                vec![stream_failure(&e)]
            }
        }
    }
}

fn stream_failure(error: &dyn Display) -> DisplayMessage {
    DisplayMessage::error(format!("Error: {error}"))
}
