//! Error types shared by the gateway, the grid engine, and the replay engine

use thiserror::Error;

/// Errors raised by an exchange gateway implementation
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExchangeError {
    /// Network failure, timeout, rate limit or 5xx; worth retrying on the next tick
    #[error("transient exchange error: {0}")]
    Transient(String),

    /// The venue answered with data we could not interpret
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The venue understood the request and refused it
    #[error("request rejected ({code}): {message}")]
    Rejected { code: i64, message: String },

    /// The venue does not offer this capability
    #[error("not supported by {venue}: {operation}")]
    Unsupported {
        venue: String,
        operation: &'static str,
    },
}

impl ExchangeError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ExchangeError::Transient(_))
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ExchangeError::InvalidResponse(err.to_string())
        } else {
            ExchangeError::Transient(err.to_string())
        }
    }
}

pub type ExchangeResult<T> = Result<T, ExchangeError>;

/// Errors raised by the grid engine
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GridError {
    /// Operator-supplied or computed parameter outside its allowed range
    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// Some orders of a batch failed while the rest went through
    #[error("{failed} of {total} {action} failed")]
    PartialExecution {
        action: &'static str,
        failed: usize,
        total: usize,
    },

    #[error(transparent)]
    Exchange(#[from] ExchangeError),
}

impl GridError {
    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        GridError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}
