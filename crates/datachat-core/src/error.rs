use thiserror::Error;

/// Top-level error type for DataChat.
///
/// Subsystem crates define their own error types and implement
/// `From<DataChatError>` so that the `?` operator works across crate
/// boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DataChatError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing required setting: {0}")]
    MissingSetting(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for DataChatError {
    fn from(err: toml::de::Error) -> Self {
        DataChatError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for DataChatError {
    fn from(err: toml::ser::Error) -> Self {
        DataChatError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for DataChatError {
    fn from(err: serde_json::Error) -> Self {
        DataChatError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for DataChat operations.
pub type Result<T> = std::result::Result<T, DataChatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DataChatError::Config("missing field".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing field");

        let err = DataChatError::MissingSetting("project_id".to_string());
        assert_eq!(err.to_string(), "Missing required setting: project_id");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: DataChatError = io_err.into();
        assert!(matches!(err, DataChatError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_toml_error_conversion() {
        let toml_err = toml::from_str::<toml::Value>("not = [valid").unwrap_err();
        let err: DataChatError = toml_err.into();
        assert!(matches!(err, DataChatError::Config(_)));
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{broken").unwrap_err();
        let err: DataChatError = json_err.into();
        assert!(matches!(err, DataChatError::Serialization(_)));
        assert!(err.to_string().starts_with("Serialization error:"));
    }
}
