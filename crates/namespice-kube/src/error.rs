//! Error types for namespice-kube

use kube::core::ErrorResponse;
use thiserror::Error;

/// Result type for namespice-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Errors that can occur during Kubernetes operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// No REST mapping for a kind
    #[error("no resource mapping for {gvk}")]
    ResourceNotMapped { gvk: String },

    /// Core model error (invalid document, config, ...)
    #[error(transparent)]
    Core(#[from] namespice_core::CoreError),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for KubeError {
    fn from(e: serde_json::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for KubeError {
    fn from(e: serde_yaml::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl KubeError {
    /// Status response of an API error, if this is one
    pub fn api_response(&self) -> Option<&ErrorResponse> {
        match self {
            KubeError::Api(kube::Error::Api(resp)) => Some(resp),
            _ => None,
        }
    }

    /// Check if this is a Kubernetes 404 Not Found error
    pub fn is_not_found(&self) -> bool {
        self.api_response().is_some_and(|resp| resp.code == 404)
    }

    /// Check if this is a 405 Method Not Allowed error
    pub fn is_method_not_allowed(&self) -> bool {
        self.api_response().is_some_and(|resp| resp.code == 405)
    }

    /// Check if a create failed because the object already exists
    ///
    /// A plain 409 Conflict (stale resourceVersion) does not qualify.
    pub fn is_already_exists(&self) -> bool {
        self.api_response()
            .is_some_and(|resp| resp.code == 409 && resp.reason == "AlreadyExists")
    }
}

/// Build an API status error, as the API server would return it
pub fn api_error(code: u16, reason: &str, message: impl Into<String>) -> KubeError {
    KubeError::Api(kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: message.into(),
        reason: reason.to_string(),
        code,
    }))
}
