//! Per-request failure taxonomy
//!
//! Every variant is turned into a response inside the request call; none of
//! them reach the connection or listener.

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServeError {
    /// Path escapes the content root or cannot be interpreted as a path
    #[error("forbidden: {reason}")]
    Forbidden { reason: &'static str },

    /// No regular file at the resolved in-bounds path
    #[error("not found")]
    NotFound,

    /// The file exists but could not be read
    #[error("failed to read file: {0}")]
    Internal(#[from] io::Error),
}

impl ServeError {
    pub const fn forbidden(reason: &'static str) -> Self {
        Self::Forbidden { reason }
    }

    pub const fn status(&self) -> u16 {
        match self {
            Self::Forbidden { .. } => 403,
            Self::NotFound => 404,
            Self::Internal(_) => 500,
        }
    }
}
