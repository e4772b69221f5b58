// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Error types for switch register operations

use thiserror::Error;

/// Result type alias for all driver operations
pub type Result<T> = std::result::Result<T, MsdError>;

/// Numeric status codes as reported by the vendor SDK.  Every `MsdError`
/// collapses to exactly one of these.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(i32)]
pub enum Status {
    Ok = 0,
    Fail = 1,
    BadParam = 4,
    NotSupported = 6,
    NoSuch = 7,
    Busy = 8,
}

/// Errors that can occur while talking to a switch
#[derive(Debug, Error)]
pub enum MsdError {
    /// A register step failed, or a bounded busy poll ran out
    #[error("operation failed: {0}")]
    Fail(String),

    /// An argument was outside the range the hardware field can hold
    #[error("bad parameter: {0}")]
    BadParam(String),

    /// The device family has no such feature
    #[error("not supported: {0}")]
    NotSupported(String),

    /// The addressed entity does not exist
    #[error("no such {0}")]
    NoSuch(String),

    /// The device is not ready to accept the request
    #[error("device busy: {0}")]
    Busy(String),

    /// The bus or link beneath the register layer failed
    #[error("transport error: {source}")]
    Transport {
        #[from]
        source: std::io::Error,
    },
}

impl MsdError {
    pub fn fail(msg: impl Into<String>) -> Self {
        Self::Fail(msg.into())
    }

    pub fn bad_param(msg: impl Into<String>) -> Self {
        Self::BadParam(msg.into())
    }

    pub fn not_supported(msg: impl Into<String>) -> Self {
        Self::NotSupported(msg.into())
    }

    pub fn no_such(msg: impl Into<String>) -> Self {
        Self::NoSuch(msg.into())
    }

    pub fn busy(msg: impl Into<String>) -> Self {
        Self::Busy(msg.into())
    }

    /// The vendor status code this error maps to.
    pub fn status(&self) -> Status {
        match self {
            MsdError::Fail(_) | MsdError::Transport { .. } => Status::Fail,
            MsdError::BadParam(_) => Status::BadParam,
            MsdError::NotSupported(_) => Status::NotSupported,
            MsdError::NoSuch(_) => Status::NoSuch,
            MsdError::Busy(_) => Status::Busy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_are_failures() {
        let e: MsdError =
            std::io::Error::new(std::io::ErrorKind::TimedOut, "mdio").into();
        assert_eq!(e.status(), Status::Fail);
        assert_eq!(MsdError::bad_param("x").status() as i32, 4);
        assert_eq!(MsdError::no_such("port 12").to_string(), "no such port 12");
    }
}
