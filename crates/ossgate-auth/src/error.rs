//! Error types for upload authorization and callback verification

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Errors raised while building a signed upload form
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl UploadError {
    /// Machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            UploadError::Config(_) => "ConfigError",
            UploadError::InvalidArgument(_) => "InvalidArgument",
            UploadError::Serialization(_) => "SerializationError",
        }
    }
}

/// Why an inbound upload callback was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RejectionKind {
    /// `Authorization` or public key URL header absent
    MissingAuthHeaders,
    /// Public key could not be obtained
    KeyFetchFailure,
    /// Signature did not verify
    SignatureInvalid,
    /// Verified body is not a form
    MalformedCallbackBody,
}

impl RejectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionKind::MissingAuthHeaders => "MissingAuthHeaders",
            RejectionKind::KeyFetchFailure => "KeyFetchFailure",
            RejectionKind::SignatureInvalid => "SignatureInvalid",
            RejectionKind::MalformedCallbackBody => "MalformedCallbackBody",
        }
    }
}

impl fmt::Display for RejectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rejected upload callback
///
/// Rejections are expected outcomes of verification, so they are returned as
/// values for the HTTP layer to translate into a response status.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{kind}: {message}")]
pub struct CallbackRejection {
    pub kind: RejectionKind,
    pub message: String,
}

impl CallbackRejection {
    pub fn new(kind: RejectionKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn missing_auth_headers(message: impl Into<String>) -> Self {
        Self::new(RejectionKind::MissingAuthHeaders, message)
    }

    pub fn key_fetch_failure(message: impl Into<String>) -> Self {
        Self::new(RejectionKind::KeyFetchFailure, message)
    }

    pub fn signature_invalid(message: impl Into<String>) -> Self {
        Self::new(RejectionKind::SignatureInvalid, message)
    }

    pub fn malformed_body(message: impl Into<String>) -> Self {
        Self::new(RejectionKind::MalformedCallbackBody, message)
    }
}
