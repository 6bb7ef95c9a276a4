//! CLI argument definitions for the DataChat binary.
//!
//! Uses `clap` with derive macros.
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use datachat_chat::RenderOptions;

/// DataChat: replay conversational-analytics response streams.
#[derive(Parser, Debug)]
#[command(name = "datachat", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay a recorded response stream (one JSON message per line).
    Render(RenderArgs),
    /// Print the effective configuration and any missing settings.
    Config,
}

#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Recorded stream file, or `-` for stdin.
    pub stream: PathBuf,

    /// Show generated SQL.
    #[arg(long = "show-sql", overrides_with = "hide_sql")]
    pub show_sql: bool,

    /// Hide generated SQL.
    #[arg(long = "hide-sql", overrides_with = "show_sql")]
    pub hide_sql: bool,

    /// Show the backend's reasoning trace.
    #[arg(long = "show-reasoning")]
    pub show_reasoning: bool,

    /// Print display messages as JSON lines instead of a render plan.
    #[arg(long = "json")]
    pub json: bool,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > DATACHAT_CONFIG env var > platform default (~/.datachat/config.toml).
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("DATACHAT_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the log level.
    ///
    /// Priority: --log-level flag > config value (which already carries
    /// any DATACHAT_LOG_LEVEL override).
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config_level.to_string())
    }
}

impl RenderArgs {
    /// Apply the visibility flags on top of the configured options.
    pub fn apply(&self, options: &mut RenderOptions) {
        if self.show_sql {
            options.show_sql = true;
        }
        if self.hide_sql {
            options.show_sql = false;
        }
        if self.show_reasoning {
            options.show_reasoning = true;
        }
    }

    /// True when the stream should be read from stdin.
    pub fn reads_stdin(&self) -> bool {
        self.stream.as_os_str() == "-"
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".datachat").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".datachat").join("config.toml");
    }
    PathBuf::from("config.toml")
}
