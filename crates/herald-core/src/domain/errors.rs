//! Failure classification for the external publish call.
//!
//! The kind decides what happens to the item after a failed attempt:
//!
//! | kind            | item afterwards                         | retried automatically |
//! |-----------------|-----------------------------------------|-----------------------|
//! | `configuration` | `failed`, invocation returns an error   | no                    |
//! | `authorization` | `failed`                                | no                    |
//! | `transient`     | `scheduled` with backoff, then `failed` | yes, up to max        |
//! | `ambiguous`     | stays `publishing` until reconciled     | no                    |
//! | `permanent`     | `failed` (user must edit)               | no                    |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing credentials or secrets on our side.
    Configuration,
    /// The external API rejected the credentials.
    Authorization,
    /// Network failure, rate limit, 5xx.
    Transient,
    /// The remote side may or may not have applied the call (e.g. timeout).
    Ambiguous,
    /// The external API rejected the content itself.
    Permanent,
}

impl ErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Transient)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Authorization => "authorization",
            ErrorKind::Transient => "transient",
            ErrorKind::Ambiguous => "ambiguous",
            ErrorKind::Permanent => "permanent",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "configuration" => Ok(ErrorKind::Configuration),
            "authorization" => Ok(ErrorKind::Authorization),
            "transient" => Ok(ErrorKind::Transient),
            "ambiguous" => Ok(ErrorKind::Ambiguous),
            "permanent" => Ok(ErrorKind::Permanent),
            other => Err(format!("unknown error kind: {other}")),
        }
    }
}

/// A classified failure of the external publish (or lookup) call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} error: {message}")]
pub struct PublishError {
    pub kind: ErrorKind,
    pub message: String,
}

impl PublishError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn authorization(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authorization, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, message)
    }

    pub fn ambiguous(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Ambiguous, message)
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Permanent, message)
    }
}

/// The last failure recorded on an item, shown to the user next to a
/// `failed` item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ItemError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<&PublishError> for ItemError {
    fn from(err: &PublishError) -> Self {
        Self::new(err.kind, err.message.clone())
    }
}

impl fmt::Display for ItemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}
