// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

use serde::Serialize;

/// Error type returned by input pulls and output pushes.
#[derive(Debug, Clone, Serialize)]
pub struct ShipError {
    pub message: String,
    pub kind: ShipErrorKind,
}

/// Classification of transport errors for stash/retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ShipErrorKind {
    /// Temporary failure that may succeed on retry (timeout, connect refused).
    Transient,
    /// Permanent failure that won't be fixed by retrying.
    Permanent,
}

pub type ShipResult<T> = Result<T, ShipError>;

impl ShipError {
    /// Create a new transient error.
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: ShipErrorKind::Transient,
        }
    }

    /// Create a new permanent error.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: ShipErrorKind::Permanent,
        }
    }

    /// Create a timeout error (transient).
    pub fn timeout(what: &str) -> Self {
        Self::transient(format!("{} timed out", what))
    }

    /// Create a communication error (transient).
    pub fn communication(message: impl Into<String>) -> Self {
        Self::transient(message)
    }

    /// Create an invalid state error (permanent).
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::permanent(message)
    }

    /// Check if this error is transient and may succeed on retry.
    pub fn is_transient(&self) -> bool {
        self.kind == ShipErrorKind::Transient
    }
}

impl From<String> for ShipError {
    fn from(value: String) -> Self {
        ShipError::transient(value)
    }
}

impl From<&str> for ShipError {
    fn from(value: &str) -> Self {
        ShipError::transient(value)
    }
}

impl From<std::io::Error> for ShipError {
    fn from(value: std::io::Error) -> Self {
        ShipError::transient(value.to_string())
    }
}

impl std::fmt::Display for ShipError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ShipError {}
