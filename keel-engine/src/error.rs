//! Engine error types.

use std::time::Duration;

use thiserror::Error;

use crate::identity::RemoteIdentity;

/// Errors returned by the outbound remote API client.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The request could not be sent or no response was received.
    #[error("transport: {0}")]
    Transport(String),

    /// Non-2xx response with the raw body as detail.
    #[error("HTTP {code}: {body}")]
    Status { code: u16, body: String },

    /// 2xx response whose body did not match the expected shape.
    #[error("decode: {0}")]
    Decode(String),

    /// The request could not be built from the identity it was given.
    /// Nothing was sent.
    #[error("invalid request: {0}")]
    Invalid(String),
}

impl ApiError {
    pub fn not_found(detail: impl Into<String>) -> Self {
        ApiError::Status {
            code: 404,
            body: detail.into(),
        }
    }

    /// 404 is the only signal treated as "resource absent".
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::Status { code: 404, .. })
    }

    /// Whether a status probe failing with this error may be retried.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Transport(_) => true,
            ApiError::Status { code, .. } => *code == 408 || *code == 429 || *code >= 500,
            ApiError::Decode(_) | ApiError::Invalid(_) => false,
        }
    }
}

/// Errors that can occur while reconciling a resource.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// Desired state violates a precondition. Raised before any remote call.
    #[error("{0}")]
    Validation(String),

    /// The call could not be made or its response could not be read.
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-2xx response carrying structured detail.
    #[error("remote API rejected the request (HTTP {status}): {detail}")]
    RemoteRejected { status: u16, detail: String },

    /// Response shape violates an expected invariant.
    #[error("malformed remote value for {field}: {detail}")]
    MalformedRemoteValue { field: String, detail: String },

    /// The operation did not reach a terminal state before the deadline.
    #[error("operation did not reach a terminal state within {0:?}")]
    LroTimeout(Duration),

    /// The remote side reported a terminal failure.
    #[error("remote operation failed: {0}")]
    LroFailed(String),

    /// The server returned a different value for a field that must not change.
    #[error("server returned {field} {returned:?}, expected {requested:?}")]
    ImmutableFieldViolation {
        field: String,
        requested: String,
        returned: String,
    },

    #[error("{0}")]
    MalformedImportIdentifier(String),

    /// The caller cancelled the verb.
    #[error("cancelled by caller")]
    Cancelled,
}

impl EngineError {
    pub fn malformed(field: impl Into<String>, detail: impl Into<String>) -> Self {
        EngineError::MalformedRemoteValue {
            field: field.into(),
            detail: detail.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        EngineError::Validation(msg.into())
    }

    /// Short category name used in diagnostic summaries.
    pub fn category(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "validation error",
            EngineError::Transport(_) => "transport error",
            EngineError::RemoteRejected { .. } => "remote API rejected the request",
            EngineError::MalformedRemoteValue { .. } => "malformed remote value",
            EngineError::LroTimeout(_) => "operation timed out",
            EngineError::LroFailed(_) => "remote operation failed",
            EngineError::ImmutableFieldViolation { .. } => "immutable field changed",
            EngineError::MalformedImportIdentifier(_) => "unexpected import identifier",
            EngineError::Cancelled => "cancelled",
        }
    }
}

impl From<ApiError> for EngineError {
    fn from(e: ApiError) -> Self {
        match e {
            ApiError::Transport(msg) => EngineError::Transport(msg),
            ApiError::Status { code, body } => EngineError::RemoteRejected {
                status: code,
                detail: body,
            },
            ApiError::Decode(msg) => EngineError::malformed("response body", msg),
            ApiError::Invalid(msg) => EngineError::Validation(msg),
        }
    }
}

/// Whether a failed verb may have changed something on the remote side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteEffect {
    /// Failed before a mutating call was issued.
    None,
    /// A mutating call was accepted but its outcome could not be confirmed.
    Unresolved,
}

/// A failed verb: the cause plus what is known about remote side effects.
#[derive(Debug, Clone, Error)]
#[error("{error}")]
pub struct VerbError {
    pub error: EngineError,
    pub remote: RemoteEffect,
    /// Identity of the possibly affected remote object, when known.
    pub identity: Option<RemoteIdentity>,
}

impl VerbError {
    pub fn before_issue(error: EngineError) -> Self {
        Self {
            error,
            remote: RemoteEffect::None,
            identity: None,
        }
    }

    pub fn after_issue(error: EngineError) -> Self {
        Self {
            error,
            remote: RemoteEffect::Unresolved,
            identity: None,
        }
    }

    pub fn with_identity(mut self, identity: Option<RemoteIdentity>) -> Self {
        self.identity = identity;
        self
    }

    /// Classify a failed mutating call. A 4xx answer means the request was
    /// refused. A 5xx or 408 answer, like a lost connection, may come from a
    /// gateway after the backend already acted.
    pub fn from_mutation(error: ApiError) -> Self {
        match error {
            ApiError::Status { code, .. } if code == 408 || code >= 500 => {
                Self::after_issue(error.into())
            }
            ApiError::Status { .. } | ApiError::Invalid(_) => Self::before_issue(error.into()),
            ApiError::Transport(_) | ApiError::Decode(_) => Self::after_issue(error.into()),
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
