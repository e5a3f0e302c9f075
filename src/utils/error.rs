use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Missing tracker credentials: {}", fields.join(", "))]
    CredentialsMissing { fields: Vec<String> },

    #[error("Rate limited by tracker after {attempts} attempts")]
    RateLimited { attempts: u32 },

    #[error("Transient tracker failure after {attempts} attempts: {message}")]
    TransientNetworkError { attempts: u32, message: String },

    #[error("Tracker rejected request ({status}): {body}")]
    ClientRequestError { status: u16, body: String },

    #[error("Tracker returned unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("Request timed out: {message}")]
    Timeout { message: String },

    #[error("Enrichment unavailable: {message}")]
    EnrichmentUnavailable { message: String },

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

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Configuration validation failed for {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },
}

pub type Result<T> = std::result::Result<T, SyncError>;

/// 錯誤分類，用於日誌與退出碼
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Network,
    Tracker,
    Data,
    Enrichment,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl SyncError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::CredentialsMissing { .. }
            | Self::ConfigError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::ConfigValidationError { .. } => ErrorCategory::Configuration,
            Self::RateLimited { .. }
            | Self::TransientNetworkError { .. }
            | Self::Timeout { .. }
            | Self::ApiError(_) => ErrorCategory::Network,
            Self::ClientRequestError { .. } | Self::UnexpectedStatus { .. } => {
                ErrorCategory::Tracker
            }
            Self::CsvError(_) | Self::SerializationError(_) | Self::ProcessingError { .. } => {
                ErrorCategory::Data
            }
            Self::EnrichmentUnavailable { .. } => ErrorCategory::Enrichment,
            Self::IoError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Enrichment => ErrorSeverity::Low,
            ErrorCategory::Network => ErrorSeverity::Medium,
            ErrorCategory::Tracker | ErrorCategory::Data => ErrorSeverity::High,
            ErrorCategory::Configuration | ErrorCategory::System => ErrorSeverity::Critical,
        }
    }

    /// 是否屬於可重試的暫時性錯誤
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::ApiError(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// 追蹤系統回傳的 HTTP 狀態碼（如有）
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::ClientRequestError { status, .. } | Self::UnexpectedStatus { status, .. } => {
                Some(*status)
            }
            Self::RateLimited { .. } => Some(429),
            Self::ApiError(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            Self::CredentialsMissing { .. } => {
                "Set tracker.base_url, tracker.email, tracker.api_token and tracker.project_key, or run with --dry-run"
            }
            Self::RateLimited { .. } => "Wait a few minutes before re-running; the sync is safe to repeat",
            Self::TransientNetworkError { .. } | Self::Timeout { .. } | Self::ApiError(_) => {
                "Check network connectivity to the tracker and re-run; existing tickets are skipped"
            }
            Self::ClientRequestError { status: 401, .. }
            | Self::ClientRequestError { status: 403, .. } => {
                "Verify the account email and API token, and that the account can create issues in the project"
            }
            Self::ClientRequestError { .. } => {
                "Check the project key, issue type names and field configuration of the tracker project"
            }
            Self::UnexpectedStatus { .. } => "Check the tracker service status",
            Self::EnrichmentUnavailable { .. } => "Check enrichment.api_key or disable enrichment",
            Self::CsvError(_) => "Make sure the input is a valid CSV file with a header row",
            Self::IoError(_) => "Check that the file exists and is readable",
            Self::SerializationError(_) => "The tracker response could not be parsed",
            Self::ConfigError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::ConfigValidationError { .. } => "Review the configuration file",
            Self::ProcessingError { .. } => "Inspect the input records",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::CredentialsMissing { fields } => {
                format!("Tracker credentials are incomplete (missing: {})", fields.join(", "))
            }
            Self::RateLimited { .. } => "The tracker is rate limiting requests".to_string(),
            Self::ClientRequestError { status, .. } => {
                format!("The tracker rejected a request with status {}", status)
            }
            other => other.to_string(),
        }
    }

    /// 依嚴重程度決定的程序退出碼
    pub fn exit_code(&self) -> i32 {
        match self.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        }
    }
}
