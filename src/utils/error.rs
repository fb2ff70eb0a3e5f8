use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid pattern: {0}")]
    PatternError(#[from] regex::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value for {field} ({value}): {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Webhook signature verification failed: {reason}")]
    AuthenticationFailure { reason: String },

    #[error("Undecodable webhook payload: {message}")]
    PayloadError { message: String },

    #[error("Fetch failed for {target}: {message}")]
    TransientFetchFailure { target: String, message: String },

    #[error("Catalog snapshot unavailable for {job}: {message}")]
    SnapshotUnavailable { job: String, message: String },

    #[error("GraphQL error: {message}")]
    GraphQlError { message: String },

    #[error("Repair failed ({operation} on {target}): {message}")]
    RepairFailure {
        operation: String,
        target: String,
        message: String,
    },

    #[error("Storage error: {message}")]
    StorageError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Network,
    Authentication,
    Catalog,
    Storage,
    Data,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ReconcileError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigError { .. }
            | Self::MissingConfigError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::PatternError(_) => ErrorCategory::Configuration,
            Self::ApiError(_) | Self::TransientFetchFailure { .. } => ErrorCategory::Network,
            Self::AuthenticationFailure { .. } => ErrorCategory::Authentication,
            Self::SnapshotUnavailable { .. }
            | Self::GraphQlError { .. }
            | Self::RepairFailure { .. } => ErrorCategory::Catalog,
            Self::IoError(_) | Self::StorageError { .. } => ErrorCategory::Storage,
            Self::CsvError(_) | Self::SerializationError(_) | Self::PayloadError { .. } => {
                ErrorCategory::Data
            }
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            // 單筆失敗，下一次排程會再處理
            Self::TransientFetchFailure { .. } | Self::RepairFailure { .. } => ErrorSeverity::Low,
            Self::ApiError(_) | Self::GraphQlError { .. } | Self::SnapshotUnavailable { .. } => {
                ErrorSeverity::Medium
            }
            Self::AuthenticationFailure { .. }
            | Self::PayloadError { .. }
            | Self::CsvError(_)
            | Self::SerializationError(_) => ErrorSeverity::High,
            Self::ConfigError { .. }
            | Self::MissingConfigError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::PatternError(_)
            | Self::IoError(_)
            | Self::StorageError { .. } => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Configuration => "Check the TOML configuration and environment variables",
            ErrorCategory::Network => "Check network connectivity and the Shopify API status, then retry",
            ErrorCategory::Authentication => "Verify the webhook secret matches the one configured in Shopify",
            ErrorCategory::Catalog => "Check the access token scopes; the next scheduled run will retry",
            ErrorCategory::Storage => "Check that the output location exists and is writable",
            ErrorCategory::Data => "Inspect the offending payload or report file",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::SnapshotUnavailable { job, .. } => {
                format!("Could not load the catalog for {}; nothing was changed", job)
            }
            Self::AuthenticationFailure { .. } => "Webhook rejected: invalid signature".to_string(),
            Self::MissingConfigError { field } => format!("Missing required setting: {}", field),
            other => other.to_string(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ReconcileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_failure_is_retryable() {
        let err = ReconcileError::SnapshotUnavailable {
            job: "menu_integrity_scan".to_string(),
            message: "timeout".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::Catalog);
        assert_eq!(err.severity(), ErrorSeverity::Medium);
        assert!(err.user_friendly_message().contains("menu_integrity_scan"));
    }

    #[test]
    fn test_config_errors_are_critical() {
        let err = ReconcileError::MissingConfigError {
            field: "webhook.secret".to_string(),
        };
        assert_eq!(err.severity(), ErrorSeverity::Critical);
        assert_eq!(err.category(), ErrorCategory::Configuration);
    }
}
