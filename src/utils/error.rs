use thiserror::Error;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration validation failed for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("{source_name} returned an error: {message}")]
    UpstreamError {
        source_name: String,
        message: String,
    },

    #[error("Bitmap decode error: {message}")]
    DecodeError { message: String },

    #[error("Render error: {message}")]
    RenderError { message: String },

    #[error("Panel '{panel}' is not configured")]
    PanelDisabled { panel: String },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Configuration,
    Data,
    Rendering,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Medium,
    High,
    Critical,
}

impl ErrorSeverity {
    /// CLI exit status. Every failure is non-zero.
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        }
    }
}

impl FrameError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            FrameError::ApiError(_) | FrameError::UpstreamError { .. } => ErrorCategory::Network,
            FrameError::ConfigError { .. }
            | FrameError::ConfigValidationError { .. }
            | FrameError::InvalidConfigValueError { .. }
            | FrameError::MissingConfigError { .. }
            | FrameError::PanelDisabled { .. } => ErrorCategory::Configuration,
            FrameError::CsvError(_)
            | FrameError::SerializationError(_)
            | FrameError::DecodeError { .. }
            | FrameError::ProcessingError { .. } => ErrorCategory::Data,
            FrameError::RenderError { .. } => ErrorCategory::Rendering,
            FrameError::IoError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            // 上游暫時失敗，可重試
            ErrorCategory::Network => ErrorSeverity::Medium,
            ErrorCategory::Configuration | ErrorCategory::Data | ErrorCategory::Rendering => {
                ErrorSeverity::High
            }
            ErrorCategory::System => ErrorSeverity::Critical,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.severity() == ErrorSeverity::Medium
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            FrameError::ApiError(_) => {
                "Check network connectivity and that the upstream API is reachable".to_string()
            }
            FrameError::UpstreamError { source_name, .. } => {
                format!("Verify the {} API key and request limits", source_name)
            }
            FrameError::CsvError(_) => {
                "Make sure the CSV has 'Date' and 'Actual Weight' columns".to_string()
            }
            FrameError::IoError(_) => "Check file paths and permissions".to_string(),
            FrameError::SerializationError(_) => {
                "The upstream response format may have changed".to_string()
            }
            FrameError::ConfigError { .. } | FrameError::ConfigValidationError { .. } => {
                "Review the TOML configuration file".to_string()
            }
            FrameError::InvalidConfigValueError { field, .. } => {
                format!("Fix the value of '{}' in the configuration", field)
            }
            FrameError::MissingConfigError { field } => {
                format!("Add '{}' to the configuration", field)
            }
            FrameError::DecodeError { .. } => {
                "The bitmap is not a valid EPBM frame".to_string()
            }
            FrameError::RenderError { .. } => {
                "Inspect the SVG output via the /svg endpoint".to_string()
            }
            FrameError::PanelDisabled { panel } => {
                format!("Add a [{}] section to the configuration", panel)
            }
            FrameError::ProcessingError { .. } => "Check the input data".to_string(),
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Network => format!("Could not fetch data: {}", self),
            ErrorCategory::Configuration => format!("Configuration problem: {}", self),
            ErrorCategory::Data => format!("Data problem: {}", self),
            ErrorCategory::Rendering => format!("Rendering failed: {}", self),
            ErrorCategory::System => format!("System error: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_follows_category() {
        let upstream = FrameError::UpstreamError {
            source_name: "Twelve Data".to_string(),
            message: "rate limited".to_string(),
        };
        assert_eq!(upstream.category(), ErrorCategory::Network);
        assert!(upstream.is_retryable());

        let missing = FrameError::MissingConfigError {
            field: "weather.api_key".to_string(),
        };
        assert_eq!(missing.severity(), ErrorSeverity::High);
        assert!(missing.recovery_suggestion().contains("weather.api_key"));

        let io = FrameError::IoError(std::io::Error::other("disk full"));
        assert_eq!(io.severity(), ErrorSeverity::Critical);
    }

    #[test]
    fn test_every_failure_exits_non_zero() {
        let errors = [
            FrameError::UpstreamError {
                source_name: "FRED".to_string(),
                message: "HTTP 503".to_string(),
            },
            FrameError::PanelDisabled {
                panel: "weight".to_string(),
            },
            FrameError::IoError(std::io::Error::other("disk full")),
        ];
        let codes: Vec<i32> = errors.iter().map(|e| e.severity().exit_code()).collect();
        assert_eq!(codes, vec![2, 1, 3]);
    }

    #[test]
    fn test_user_friendly_message_mentions_cause() {
        let err = FrameError::PanelDisabled {
            panel: "fred".to_string(),
        };
        let msg = err.user_friendly_message();
        assert!(msg.starts_with("Configuration problem"));
        assert!(msg.contains("fred"));
    }
}
