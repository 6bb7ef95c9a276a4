//! DataChat binary - composition root.
//!
//! 1. Parse CLI arguments and load configuration from TOML (+ env overrides)
//! 2. Install the tracing subscriber
//! 3. `render`: replay a recorded backend stream through the chat handler and
//!    print either the display messages (JSON lines) or the render plan
//! 4. `config`: print the effective configuration and missing settings

mod cli;

use std::io::{self, BufRead, BufReader, Write};
use std::sync::Arc;

use clap::Parser;

use datachat_chat::{
    ChatError, ChatHandler, ProtocolMessage, RenderDirective, RenderOptions, RenderPlanner,
    TracingSink,
};
use datachat_core::types::DisplayMessage;
use datachat_core::DataChatConfig;

use crate::cli::{CliArgs, Command, RenderArgs};

#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Read the recorded stream, one protocol message per non-empty line.
///
/// A line that does not parse ends the stream with a decode error, which the
/// handler reports like any other stream failure.
fn read_stream<R: BufRead>(reader: R) -> impl Iterator<Item = Result<ProtocolMessage, ChatError>> {
    reader.lines().filter_map(|line| match line {
        Ok(line) if line.trim().is_empty() => None,
        Ok(line) => Some(ProtocolMessage::from_json_str(&line)),
        Err(e) => Some(Err(ChatError::Stream(e.to_string()))),
    })
}

/// Plain-text rendition of one directive.
fn describe(directive: &RenderDirective) -> String {
    match directive {
        RenderDirective::UserText(text) => format!("> {text}"),
        RenderDirective::ErrorBanner(text) => format!("[error] {text}"),
        RenderDirective::Markdown(text) => text.clone(),
        RenderDirective::Reasoning(text) => format!("[reasoning]\n{text}"),
        RenderDirective::Sql(sql) => format!("```sql\n{sql}\n```"),
        RenderDirective::VegaLite(spec) => {
            let mark = match spec.get("mark") {
                Some(serde_json::Value::String(m)) => m.clone(),
                Some(serde_json::Value::Object(m)) => m
                    .get("type")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("chart")
                    .to_string(),
                _ => "chart".to_string(),
            };
            let rows = spec
                .get("data")
                .and_then(|d| d.get("values"))
                .and_then(serde_json::Value::as_array)
                .map_or(0, Vec::len);
            format!("[chart] {mark} ({rows} rows)")
        }
        RenderDirective::Image(image) => format!(
            "[image] {} ({} bytes)",
            image.mime_type.as_deref().unwrap_or("image"),
            image.bytes.len()
        ),
        RenderDirective::Table { table, csv } => format!(
            "[table] {} columns x {} rows ({})\n{}",
            table.column_count(),
            table.row_count(),
            csv.file_name,
            csv.content.trim_end()
        ),
    }
}

fn run_render(
    args: &RenderArgs,
    config: &DataChatConfig,
    out: &mut impl Write,
) -> Result<Vec<DisplayMessage>, AppError> {
    let handler = ChatHandler::new(Arc::new(TracingSink));

    let messages = if args.reads_stdin() {
        let stdin = io::stdin();
        handler.process_stream(read_stream(stdin.lock()))
    } else {
        let file = std::fs::File::open(&args.stream)?;
        handler.process_stream(read_stream(BufReader::new(file)))
    };
    tracing::info!(messages = messages.len(), "Stream replayed");

    if args.json {
        for message in &messages {
            writeln!(out, "{}", serde_json::to_string(message)?)?;
        }
        return Ok(messages);
    }

    let mut options = RenderOptions::from_config(config);
    args.apply(&mut options);
    let planner = RenderPlanner::new(options, Arc::new(TracingSink));
    for directive in planner.plan_turn(&messages) {
        writeln!(out, "{}\n", describe(&directive))?;
    }
    Ok(messages)
}

fn run_config(config: &DataChatConfig, out: &mut impl Write) -> Result<(), AppError> {
    writeln!(out, "{}", serde_json::to_string_pretty(config)?)?;
    let missing = config.validate_required();
    if missing.is_empty() {
        writeln!(out, "All required settings are present.")?;
    } else {
        writeln!(out, "Missing required settings: {}", missing.join(", "))?;
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let mut config = DataChatConfig::load_or_default(&config_file);
    config.apply_env_overrides();

    // Tracing. RUST_LOG wins over the configured level.
    let level = args.resolve_log_level(&config.general.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&level)),
        )
        .with_writer(io::stderr)
        .init();

    tracing::info!("Starting DataChat v{}", env!("CARGO_PKG_VERSION"));
    tracing::debug!(path = %config_file.display(), "Configuration resolved");

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match &args.command {
        Command::Render(render) => {
            run_render(render, &config, &mut out)?;
        }
        Command::Config => run_config(&config, &mut out)?,
    }
    Ok(())
}
