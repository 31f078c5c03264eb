use thiserror::Error;

/// Failure while loading or administering the credential record.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read credential record {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("credential record {path} is not valid JSON: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("credential store is read-only (runtime override in effect)")]
    ReadOnly,

    #[error("credential must not be empty")]
    EmptyCredential,
}

/// A call to the external generative API failed.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ProviderError {
    pub message: String,
    /// HTTP status, when the provider answered at all.
    pub status: Option<u16>,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            message: format!("{} {}", status, message.into()),
            status: Some(status),
        }
    }
}

/// Why a single generation attempt was rejected.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("could not parse model reply as JSON: {0}")]
    PayloadParse(#[from] serde_json::Error),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("only {valid} valid questions generated, need at least {required}")]
    InsufficientValidQuestions { valid: usize, required: usize },
}

impl AttemptError {
    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AttemptError::Provider(_) => "provider_error",
            AttemptError::PayloadParse(_) => "payload_parse_error",
            AttemptError::Schema(_) => "schema_error",
            AttemptError::InsufficientValidQuestions { .. } => "insufficient_valid_questions",
        }
    }
}

/// Errors that cross the generator boundary.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("no API credential available")]
    NoCredentialAvailable,

    #[error("failed to generate questions after {attempts} attempts: {last}")]
    GenerationFailed {
        attempts: u32,
        #[source]
        last: AttemptError,
    },

    #[error("invalid generation request: {0}")]
    InvalidRequest(String),

    #[error("generation timed out after {0:?}")]
    Timeout(std::time::Duration),
}
