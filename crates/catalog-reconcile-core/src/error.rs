//! Error taxonomy for the reconciliation engine.
//!
//! Every fallible engine operation returns [`EngineResult`]. Variants carry
//! enough context (ids, field names, row indices) for a caller to render a
//! precise message without re-querying engine state.

use thiserror::Error;

use crate::models::SuggestionStatus;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Unknown suggestion, record, or ledger key.
    #[error("not found: {message}")]
    NotFound { message: String },
    /// A transition was attempted on a suggestion that is no longer pending.
    #[error("suggestion {id} already resolved (status: {status})")]
    AlreadyResolved { id: String, status: SuggestionStatus },
    /// Malformed bulk row, unsupported file shape, or unknown field name.
    #[error("validation error: {message}")]
    Validation { message: String },
    /// Failure reported by an external store or sink, passed through as-is.
    #[error("persistence error: {message}")]
    Persistence { message: String },
    /// The resolution took effect (record written, suggestion marked) but
    /// mirroring it to the suggestion sink failed.
    #[error("suggestion {id} resolved but not audited: {message}")]
    Unaudited { id: String, message: String },
}

impl EngineError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn already_resolved(id: impl Into<String>, status: SuggestionStatus) -> Self {
        Self::AlreadyResolved {
            id: id.into(),
            status,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Wrap a capability failure, keeping the whole `anyhow` context chain.
    pub fn persistence(err: anyhow::Error) -> Self {
        Self::Persistence {
            message: format!("{:#}", err),
        }
    }

    /// Convert a capability failure. Engine errors raised inside a store
    /// (e.g. a diff naming an unknown field) keep their original variant;
    /// everything else becomes [`EngineError::Persistence`].
    pub fn from_store(err: anyhow::Error) -> Self {
        match err.downcast::<EngineError>() {
            Ok(engine) => engine,
            Err(other) => Self::persistence(other),
        }
    }

    pub fn unaudited(id: impl Into<String>, cause: EngineError) -> Self {
        let message = match cause {
            Self::Persistence { message } => message,
            other => other.to_string(),
        };
        Self::Unaudited {
            id: id.into(),
            message,
        }
    }

    /// True for errors that describe caller input rather than a storage fault.
    pub fn is_user_error(&self) -> bool {
        !matches!(self, Self::Persistence { .. } | Self::Unaudited { .. })
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
