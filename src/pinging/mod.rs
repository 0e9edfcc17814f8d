pub mod mc_legacy;
pub mod mc_query;

use std::io::{self, ErrorKind};

use serde::Serialize;
use thiserror::Error;

use crate::target::Target;

pub trait Pinger {

    /// The data returned from a ping.
    type Data;

    /// A reported error value.
    type Error: std::error::Error;

    fn ping(&self, target: &Target) -> std::result::Result<Self::Data, Self::Error>;
}

/// Every way a single probe can fail.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ProbeError {
    #[error("could not connect: {0}")]
    ConnectionFailed(String),

    #[error("timed out")]
    Timeout,

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("bad challenge token: {0}")]
    BadChallengeToken(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ProbeErrorKind {
    ConnectionFailed,
    Timeout,
    MalformedResponse,
    BadChallengeToken,
}

impl ProbeError {
    /// Classifies an I/O failure that happened while talking to the server.
    ///
    /// Sockets with a read timeout report the elapsed bound as `WouldBlock` on
    /// unix and `TimedOut` on windows, so both count as a timeout.
    pub fn from_io(err: io::Error) -> Self {
        match err.kind() {
            ErrorKind::TimedOut | ErrorKind::WouldBlock => ProbeError::Timeout,
            ErrorKind::UnexpectedEof => {
                ProbeError::MalformedResponse("response ended early".to_string())
            }
            ErrorKind::InvalidData => ProbeError::MalformedResponse(err.to_string()),
            _ => ProbeError::ConnectionFailed(err.to_string()),
        }
    }

    pub fn kind(&self) -> ProbeErrorKind {
        match self {
            ProbeError::ConnectionFailed(_) => ProbeErrorKind::ConnectionFailed,
            ProbeError::Timeout => ProbeErrorKind::Timeout,
            ProbeError::MalformedResponse(_) => ProbeErrorKind::MalformedResponse,
            ProbeError::BadChallengeToken(_) => ProbeErrorKind::BadChallengeToken,
        }
    }
}

impl From<io::Error> for ProbeError {
    fn from(err: io::Error) -> Self {
        ProbeError::from_io(err)
    }
}
