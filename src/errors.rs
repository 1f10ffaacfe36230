use thiserror::Error;

/// Per-request failures that reject the call before any I/O happens.
#[derive(Debug, Error)]
pub enum ToolCallError {
    #[error("unknown cluster '{id}', valid ids: {}", valid.join(", "))]
    UnknownCluster { id: String, valid: Vec<String> },

    #[error("invalid {field}: {message}")]
    InvalidInput { field: String, message: String },

    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    #[error("operation '{operation}' failed for cluster '{cluster}': {message}")]
    Operation {
        operation: String,
        cluster: String,
        message: String,
    },
}

impl ToolCallError {
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        ToolCallError::InvalidInput {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Failures of one external collaborator call. Caught at the point of use
/// and demoted to a partial-data ToolError, or short-circuited when the
/// data is foundational for the whole handler.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("cluster api: {0}")]
    Kube(#[from] kube::Error),

    #[error("cluster config: {0}")]
    KubeConfig(String),

    #[error("cloud api request: {0}")]
    Http(#[from] reqwest::Error),

    #[error("cloud api returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("credential unavailable: {0}")]
    Credential(String),

    #[error("decoding response: {0}")]
    Decode(String),
}
