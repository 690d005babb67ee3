//! Error types for rowlens.
//!
//! Two shapes live here. [`QueryError`] is the descriptor carried inline in a
//! [`QueryResult`](crate::engine::QueryResult); row operations never fail with
//! `Err`. [`RowlensError`] is the propagated error used by introspection,
//! configuration, auth and everything else.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Where an inline query error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A filter or option was rejected before anything was sent.
    Validation,
    /// The backend answered with an error.
    #[default]
    Backend,
    /// The request never produced a backend answer.
    Transport,
    /// The answer could not be decoded into the requested row type.
    Decode,
}

/// Structured error descriptor returned inline from row operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{message}")]
pub struct QueryError {
    #[serde(default)]
    pub kind: ErrorKind,
    /// Backend error code (Postgres SQLSTATE or PostgREST `PGRST...`).
    #[serde(default)]
    pub code: Option<String>,
    pub message: String,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub hint: Option<String>,
}

impl QueryError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            message: message.into(),
            details: None,
            hint: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn backend(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            ..Self::new(ErrorKind::Backend, message)
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transport, message)
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Decode, message)
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// The main error type for rowlens operations that propagate failures.
#[derive(Debug, Error)]
pub enum RowlensError {
    /// Missing or unusable configuration (credentials, URLs).
    #[error("Configuration error: {0}")]
    Config(String),

    /// A filter or option failed local validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A backend query failed.
    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    /// Failed to parse a filter or order expression.
    #[error("Parse error at position {position}: {message}")]
    Parse { position: usize, message: String },

    /// Authentication failed or no session is available.
    #[error("Auth error: {0}")]
    Auth(String),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Database connection error.
    #[error("Database error: {0}")]
    Database(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config file error: {0}")]
    Toml(#[from] toml::de::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RowlensError {
    /// Create a parse error at the given position.
    pub fn parse(position: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            position,
            message: message.into(),
        }
    }
}

/// Result type alias for rowlens operations.
pub type RowlensResult<T> = Result<T, RowlensError>;
