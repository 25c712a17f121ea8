use thiserror::Error;

#[derive(Error, Debug)]
pub enum AssessmentError {
    #[error("Missing session input '{field}': {message}")]
    InputError { field: String, message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Vehicle lookup failed (status {status}): {reason}")]
    FetchError { status: u16, reason: String },

    #[error("Inference request failed (status {status}): {message}")]
    InferenceError { status: u16, message: String },

    #[error("Could not decode {stage} output: {message}")]
    ParseError { stage: String, message: String },

    #[error("Part operation '{part}' is invalid: {message}")]
    InvariantError { part: String, message: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing configuration field: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Stage '{stage}' cannot run: {details}")]
    StageError { stage: String, details: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Input,
    Lookup,
    Inference,
    Decode,
    Invariant,
    Configuration,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AssessmentError {
    pub fn input(field: &str, message: impl Into<String>) -> Self {
        Self::InputError {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn parse(stage: &str, message: impl Into<String>) -> Self {
        Self::ParseError {
            stage: stage.to_string(),
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InputError { .. } | Self::InvalidInput { .. } => ErrorCategory::Input,
            Self::FetchError { .. } => ErrorCategory::Lookup,
            Self::InferenceError { .. } => ErrorCategory::Inference,
            Self::ParseError { .. } | Self::SerializationError(_) => ErrorCategory::Decode,
            Self::InvariantError { .. } => ErrorCategory::Invariant,
            Self::ConfigError { .. }
            | Self::MissingConfigError { .. }
            | Self::InvalidConfigValueError { .. } => ErrorCategory::Configuration,
            Self::IoError(_) | Self::StageError { .. } => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Decode | ErrorCategory::Invariant => ErrorSeverity::Medium,
            ErrorCategory::Input | ErrorCategory::Lookup | ErrorCategory::Inference => {
                ErrorSeverity::High
            }
            ErrorCategory::Configuration | ErrorCategory::System => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            Self::InputError { .. } => {
                "Supply at least one damage image, a registration and a loss description"
            }
            Self::InvalidInput { .. } => "Check the vehicle valuation returned by the lookup service",
            Self::FetchError { status: 401 | 403, .. } => {
                "Check the vehicle data API key in the configuration"
            }
            Self::FetchError { .. } => "Verify the registration number and retry the assessment",
            Self::InferenceError { status: 401 | 403, .. } => {
                "Check the inference API key in the configuration"
            }
            Self::InferenceError { status: 429, .. } => {
                "The inference service is rate limiting requests, wait before retrying"
            }
            Self::InferenceError { .. } => "Retry the assessment once the inference service responds",
            Self::ParseError { .. } | Self::SerializationError(_) => {
                "The model returned unstructured output, rerun the assessment or review manually"
            }
            Self::InvariantError { .. } => {
                "The generated repair plan is contradictory and needs a manual review"
            }
            Self::ConfigError { .. }
            | Self::MissingConfigError { .. }
            | Self::InvalidConfigValueError { .. } => "Fix the configuration file and try again",
            Self::IoError(_) => "Check file paths and permissions",
            Self::StageError { .. } => "Report this as a bug: stages ran out of order",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::InputError { field, .. } => format!("The assessment needs a value for {}", field),
            Self::FetchError { status, .. } => {
                format!("The vehicle could not be looked up (status {})", status)
            }
            Self::InferenceError { status, .. } => {
                format!("The damage assessment service failed (status {})", status)
            }
            Self::ParseError { stage, .. } => {
                format!("The {} result could not be read as structured data", stage)
            }
            Self::InvariantError { part, .. } => {
                format!("The repair plan marks '{}' for both repair and replacement", part)
            }
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AssessmentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_follows_category() {
        let parse = AssessmentError::parse("fraud check", "eof");
        assert_eq!(parse.category(), ErrorCategory::Decode);
        assert_eq!(parse.severity(), ErrorSeverity::Medium);

        let fetch = AssessmentError::FetchError {
            status: 404,
            reason: "Not Found".to_string(),
        };
        assert_eq!(fetch.severity(), ErrorSeverity::High);

        let config = AssessmentError::config("bad");
        assert_eq!(config.severity(), ErrorSeverity::Critical);
    }

    #[test]
    fn test_auth_failures_get_specific_suggestion() {
        let err = AssessmentError::InferenceError {
            status: 401,
            message: "unauthorized".to_string(),
        };
        assert!(err.recovery_suggestion().contains("API key"));
    }
}
