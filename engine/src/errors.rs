//! Engine error taxonomy.
//!
//! Every failure maps onto an [`ErrorCategory`] so a routing layer can pick a
//! status without matching on individual variants.

use oasis_store::StoreError;
use thiserror::Error;

/// Error category for structured logging and status mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The caller referenced something missing or sent malformed input.
    Client,
    /// Engine configuration cannot serve the request.
    Config,
    /// The model reply could not be turned into a complete result.
    Reliability,
    /// The provider endpoint failed or rejected the call.
    Transport,
    /// Reading or writing the store failed.
    Persistence,
}

impl ErrorCategory {
    /// Machine-readable code for logging
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Client => "CLIENT_ERROR",
            Self::Config => "CONFIG_ERROR",
            Self::Reliability => "RELIABILITY_ERROR",
            Self::Transport => "TRANSPORT_ERROR",
            Self::Persistence => "PERSISTENCE_ERROR",
        }
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Client)
    }
}

/// Errors from the chat-completion transport.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Network request failed.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error ({status}): {message}")]
    ApiResponse {
        status: u16,
        message: String,
        error_type: Option<String>,
        code: Option<String>,
        param: Option<String>,
    },

    /// Failed to parse API response.
    #[error("Parse error: {0}")]
    Parse(String),
}

impl ApiError {
    /// Whether the endpoint refused one of the sampling or token-limit
    /// parameters, as opposed to failing for any other reason.
    pub fn is_parameter_rejection(&self) -> bool {
        let Self::ApiResponse {
            status,
            message,
            code,
            param,
            ..
        } = self
        else {
            return false;
        };
        if *status != 400 {
            return false;
        }
        let names_param = |text: &str| {
            let text = text.to_ascii_lowercase();
            text.contains("max_tokens")
                || text.contains("max_completion_tokens")
                || text.contains("temperature")
        };
        let code_matches = matches!(
            code.as_deref(),
            Some("unsupported_parameter" | "unsupported_value")
        );
        let param_matches = param.as_deref().is_some_and(names_param);
        (code_matches && (param_matches || names_param(message)))
            || (param_matches && message.to_ascii_lowercase().contains("unsupported"))
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unknown prompt variant '{0}'")]
    UnknownVariant(String),

    #[error("unsupported LLM provider '{0}'; supported providers: openai")]
    UnsupportedProvider(String),

    #[error("missing credential: {0} is not set")]
    MissingCredential(&'static str),

    #[error("config error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("model reply is not parseable JSON: {0}")]
    UnparsableResponse(String),

    #[error("model reply violates the response schema: {detail}")]
    SchemaViolation { missing: Vec<String>, detail: String },

    #[error("repair round failed ({reason}); still missing: {}", .missing.join(", "))]
    RepairExhausted { missing: Vec<String>, reason: String },

    #[error("completion truncated at the output token limit")]
    Truncated,

    #[error(transparent)]
    Transport(#[from] ApiError),

    #[error(transparent)]
    Store(StoreError),
}

impl EngineError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } | Self::InvalidArgument(_) | Self::UnknownVariant(_) => {
                ErrorCategory::Client
            }
            Self::UnsupportedProvider(_) | Self::MissingCredential(_) | Self::Config { .. } => {
                ErrorCategory::Config
            }
            Self::UnparsableResponse(_)
            | Self::SchemaViolation { .. }
            | Self::RepairExhausted { .. }
            | Self::Truncated => ErrorCategory::Reliability,
            Self::Transport(_) => ErrorCategory::Transport,
            Self::Store(_) => ErrorCategory::Persistence,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn schema(missing: Vec<String>, detail: impl Into<String>) -> Self {
        Self::SchemaViolation {
            missing,
            detail: detail.into(),
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { kind, id } => Self::NotFound { kind, id },
            StoreError::InvalidArgument(message) => Self::InvalidArgument(message),
            StoreError::AlreadyExists { kind, id } => {
                Self::InvalidArgument(format!("{kind} already exists: {id}"))
            }
            other => Self::Store(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
