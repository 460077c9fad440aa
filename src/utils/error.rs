use std::fmt;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

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

    #[error("Missing required configuration field: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid {field} '{value}': {reason}")]
    ValidationError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("No commands registered for tracker model '{model}'")]
    NoCommandsForModel { model: String },

    #[error("Invalid command set: {reason}")]
    InvalidCommandSet { reason: String },

    #[error("Failed: Tracker with the same id or name is already registered with another user")]
    RegistrationForbidden,

    #[error("Timed out after {timeout:?} while registering tracker with API")]
    RegistrationTimeout { timeout: Duration },

    #[error("Failed to register tracker with API: {message}")]
    RegistrationTransportError { message: String },

    #[error("Failed to register tracker with API: unexpected status {status}")]
    RegistrationRejected { status: u16 },

    #[error("SMS permission not granted: {message}")]
    PermissionDenied { message: String },

    #[error("Failed to send SMS: {message}")]
    SmsTransportError { message: String },

    #[error("Inbound SMS stream closed before provisioning completed")]
    InboundClosed,

    #[error("Another provisioning session is already listening for SMS replies")]
    SessionBusy,

    #[error("Timed out after {timeout:?} waiting for SMS response from tracker")]
    SmsTimeout { timeout: Duration },

    #[error("Failed: Tracker with the same id or name is already registered with another user")]
    ConnectivityConflict,

    #[error("Timed out after {timeout:?} waiting for tracker to connect")]
    ConnectivityTimeout { timeout: Duration },

    #[error("Failed waiting for tracker to connect: {message}")]
    ConnectivityError { message: String },

    #[error("Provisioning task aborted: {message}")]
    Aborted { message: String },
}

pub type Result<T> = std::result::Result<T, ProvisionError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Validation,
    Registration,
    Sms,
    Connectivity,
    Network,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ProvisionError {
    pub fn category(&self) -> ErrorCategory {
        use ProvisionError::*;
        match self {
            ApiError(_) => ErrorCategory::Network,
            IoError(_) | SerializationError(_) | Aborted { .. } => ErrorCategory::System,
            ConfigError { .. }
            | ConfigValidationError { .. }
            | InvalidConfigValueError { .. }
            | MissingConfigError { .. }
            | NoCommandsForModel { .. }
            | InvalidCommandSet { .. } => ErrorCategory::Configuration,
            ValidationError { .. } => ErrorCategory::Validation,
            RegistrationForbidden
            | RegistrationTimeout { .. }
            | RegistrationTransportError { .. }
            | RegistrationRejected { .. } => ErrorCategory::Registration,
            PermissionDenied { .. }
            | SmsTransportError { .. }
            | InboundClosed
            | SessionBusy
            | SmsTimeout { .. } => ErrorCategory::Sms,
            ConnectivityConflict | ConnectivityTimeout { .. } | ConnectivityError { .. } => {
                ErrorCategory::Connectivity
            }
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        use ProvisionError::*;
        match self {
            ValidationError { .. } => ErrorSeverity::Low,
            RegistrationTimeout { .. } | SessionBusy | ApiError(_) => ErrorSeverity::Medium,
            IoError(_) | SerializationError(_) | InboundClosed | Aborted { .. } => {
                ErrorSeverity::Critical
            }
            _ => ErrorSeverity::High,
        }
    }

    /// 只有註冊逾時可以直接重新執行，其餘錯誤需使用者先處理
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            ProvisionError::RegistrationTimeout { .. } | ProvisionError::SessionBusy
        )
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        use ProvisionError::*;
        match self {
            ApiError(_) | RegistrationTransportError { .. } | RegistrationTimeout { .. } => {
                "Please verify your internet connectivity and try again"
            }
            ConfigError { .. }
            | ConfigValidationError { .. }
            | InvalidConfigValueError { .. }
            | MissingConfigError { .. } => "Check the configuration file and environment variables",
            ValidationError { .. } => "Correct the tracker details and submit again",
            NoCommandsForModel { .. } | InvalidCommandSet { .. } => {
                "Select another model or ask an administrator to register its commands"
            }
            RegistrationForbidden | ConnectivityConflict => {
                "Use a different tracker id or name, or contact the current owner"
            }
            RegistrationRejected { .. } => "Verify that your API key is valid",
            PermissionDenied { .. } => "Grant SMS permission (configure the SMS gateway token)",
            SmsTransportError { .. } | InboundClosed => "Check the SMS gateway and retry",
            SessionBusy => "Wait for the running provisioning to finish",
            SmsTimeout { .. } => {
                "Verify the tracker phone number and SIM; some commands may already be applied"
            }
            ConnectivityTimeout { .. } | ConnectivityError { .. } => {
                "Check that the tracker has network coverage and power, then verify again"
            }
            IoError(_) | SerializationError(_) | Aborted { .. } => "Check the logs for details",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Network => format!("Network problem: {}", self),
            _ => self.to_string(),
        }
    }
}

/// 錯誤發生所在的階段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Configuration,
    Registration,
    Sms,
    ConnectivityWait,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Configuration => "configuration",
            Stage::Registration => "registration",
            Stage::Sms => "sms",
            Stage::ConnectivityWait => "connectivity-wait",
        };
        f.write_str(name)
    }
}

/// 附帶階段標記的終止錯誤
#[derive(Error, Debug)]
#[error("[{stage}] {error}")]
pub struct ProvisionFailure {
    pub stage: Stage,
    #[source]
    pub error: ProvisionError,
}

impl ProvisionFailure {
    pub fn new(stage: Stage, error: ProvisionError) -> Self {
        Self { stage, error }
    }

    pub fn is_retriable(&self) -> bool {
        self.error.is_retriable()
    }

    pub fn severity(&self) -> ErrorSeverity {
        self.error.severity()
    }
}
