//! The closed vocabulary of request-lifecycle failures.
//!
//! Setting one of these on the lifecycle context is the short-circuit signal:
//! the orchestrator diverts to the error event instead of entering the next stage.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Why a request could not proceed along the normal lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    #[serde(rename = "error-controller-cannot-dispatch")]
    ControllerCannotDispatch,
    #[serde(rename = "error-controller-not-found")]
    ControllerNotFound,
    #[serde(rename = "error-controller-invalid")]
    ControllerInvalid,
    /// A listener or controller failed with an error instead of classifying the problem.
    #[serde(rename = "error-exception")]
    Exception,
    #[serde(rename = "error-router-no-match")]
    RouterNoMatch,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 5] = [
        Self::ControllerCannotDispatch,
        Self::ControllerNotFound,
        Self::ControllerInvalid,
        Self::Exception,
        Self::RouterNoMatch,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ControllerCannotDispatch => "error-controller-cannot-dispatch",
            Self::ControllerNotFound => "error-controller-not-found",
            Self::ControllerInvalid => "error-controller-invalid",
            Self::Exception => "error-exception",
            Self::RouterNoMatch => "error-router-no-match",
        }
    }

    /// HTTP status an error page for this kind should carry.
    #[must_use]
    pub const fn suggested_status(self) -> u16 {
        match self {
            Self::ControllerNotFound | Self::RouterNoMatch => 404,
            Self::ControllerCannotDispatch | Self::ControllerInvalid | Self::Exception => 500,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown error kind: {0}")]
pub struct UnknownErrorKind(pub String);

impl FromStr for ErrorKind {
    type Err = UnknownErrorKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownErrorKind(s.to_string()))
    }
}
