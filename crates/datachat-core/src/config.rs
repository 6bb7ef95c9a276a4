use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{DataChatError, Result};

/// Top-level configuration for the DataChat client.
///
/// Loaded from `~/.datachat/config.toml` by default. Each section corresponds
/// to one concern of the client; every section falls back to its defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataChatConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub cloud: CloudConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub data_source: DataSourceConfig,
    #[serde(default)]
    pub features: FeatureConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

impl DataChatConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: DataChatConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Apply `DATACHAT_*` environment overrides on top of the file values.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup. Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("DATACHAT_PROJECT_ID") {
            self.cloud.project_id = v;
        }
        if let Some(v) = get("DATACHAT_LOCATION") {
            self.cloud.location = v;
        }
        if let Some(v) = get("DATACHAT_AGENT_ID") {
            self.agent.default_agent_id = v;
        }
        if let Some(v) = get("DATACHAT_CONVERSATION_MODE") {
            match v.parse::<ConversationMode>() {
                Ok(mode) => self.agent.conversation_mode = mode,
                Err(e) => warn!(value = %v, error = %e, "Ignoring DATACHAT_CONVERSATION_MODE"),
            }
        }
        if let Some(v) = get("DATACHAT_LOG_LEVEL") {
            self.general.log_level = v;
        }
    }

    /// Data-source table ids, split from the comma-separated setting.
    pub fn table_ids_list(&self) -> Vec<String> {
        self.data_source
            .table_ids
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect()
    }

    /// Parent resource path for backend calls.
    pub fn parent_resource(&self) -> String {
        format!(
            "projects/{}/locations/{}",
            self.cloud.project_id, self.cloud.location
        )
    }

    /// Full resource name of the default data agent.
    pub fn agent_resource_name(&self) -> String {
        format!(
            "{}/dataAgents/{}",
            self.parent_resource(),
            self.agent.default_agent_id
        )
    }

    /// Names of required settings that are not configured.
    pub fn validate_required(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if self.cloud.project_id.trim().is_empty() {
            missing.push("DATACHAT_PROJECT_ID".to_string());
        }
        missing
    }

    /// Like [`validate_required`](Self::validate_required), as an error.
    pub fn ensure_valid(&self) -> Result<()> {
        let missing = self.validate_required();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(DataChatError::MissingSetting(missing.join(", ")))
        }
    }
}

/// General client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Cloud project hosting the conversational-analytics backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    /// Billing project where the backend API is enabled.
    pub project_id: String,
    /// API location. The backend only serves `global`.
    pub location: String,
    /// Optional path to a service-account key file.
    pub credentials_path: Option<String>,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            location: "global".to_string(),
            credentials_path: None,
        }
    }
}

/// How conversation history is kept between turns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationMode {
    /// The backend holds the history in a conversation resource.
    #[default]
    Stateful,
    /// The client resends prior user turns with every request.
    Stateless,
}

impl std::str::FromStr for ConversationMode {
    type Err = DataChatError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stateful" => Ok(ConversationMode::Stateful),
            "stateless" => Ok(ConversationMode::Stateless),
            other => Err(DataChatError::Config(format!(
                "unknown conversation mode: {other}"
            ))),
        }
    }
}

/// Data agent selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub default_agent_id: String,
    /// Conversation to resume; a new one is created when unset.
    pub default_conversation_id: Option<String>,
    pub conversation_mode: ConversationMode,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            default_agent_id: "datachat_agent".to_string(),
            default_conversation_id: None,
            conversation_mode: ConversationMode::Stateful,
        }
    }
}

/// Warehouse tables the agent is bound to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSourceConfig {
    pub project_id: String,
    pub dataset_id: String,
    /// Comma-separated table ids.
    pub table_ids: String,
}

impl Default for DataSourceConfig {
    fn default() -> Self {
        Self {
            project_id: "bigquery-public-data".to_string(),
            dataset_id: "thelook_ecommerce".to_string(),
            table_ids: "orders,order_items,products,users".to_string(),
        }
    }
}

/// Feature flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Allow the agent to run its advanced analysis step.
    pub enable_python_analysis: bool,
    /// Synthesize fallback charts for tables without a dedicated chart.
    pub enable_chart_rendering: bool,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            enable_python_analysis: true,
            enable_chart_rendering: true,
        }
    }
}

/// Presentation settings consumed by the render planner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub app_title: String,
    /// Upper bound on history messages resent in stateless mode.
    pub max_message_history: usize,
    pub show_sql: bool,
    pub show_reasoning: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            app_title: "DataChat".to_string(),
            max_message_history: 50,
            show_sql: true,
            show_reasoning: false,
        }
    }
}
