//! Response pipeline for the DataChat client.
//!
//! Takes the backend's streamed protocol messages and turns them into typed
//! display messages: decoding result tables, pulling chart specs out of
//! prose, repairing chart specs for the renderer, and planning how each
//! message is drawn. Also builds the chat requests that start a stream.

pub mod decoder;
pub mod diagnostics;
pub mod error;
pub mod extractor;
pub mod fallback;
pub mod handler;
pub mod normalizer;
pub mod parser;
pub mod protocol;
pub mod render;
pub mod request;

pub use decoder::{decode_table, CellVariant};
pub use diagnostics::{Diagnostic, DiagnosticLevel, DiagnosticSink, RecordingSink, TracingSink};
pub use error::ChatError;
pub use extractor::{extract_chart_spec, strip_orphan_lead_in};
pub use fallback::{chart_from_table, ChartType, FallbackOptions};
pub use handler::{ChatHandler, ChatTransport};
pub use normalizer::{has_data_source, normalize_chart_spec};
pub use parser::{parse_message, MessageParser};
pub use protocol::{plainify, Payload, ProtocolMessage, SystemMessage, Variant};
pub use render::{CsvExport, RenderDirective, RenderOptions, RenderPlanner};
pub use request::{new_conversation_id, validate_question, ChatRequest};
