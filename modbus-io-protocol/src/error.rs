use std::{
    error::Error,
    fmt::Display,
    io::{self},
};

/// Errors that may occur when reading a frame from a stream.
///
/// Every variant except [`ReadError::Closed`] means that the peer sent something
/// that cannot be answered. The stream is no longer aligned to a frame boundary
/// afterwards, so the connection should be dropped.
#[derive(Debug)]
pub enum ReadError {
    IoError(io::Error),
    /// The peer closed the stream in between two frames.
    Closed,
    InvalidProtocolId(u16),
    InvalidLength(u16),
    InvalidFormat(String),
}

impl ReadError {
    /// Whether this error is an orderly end of stream rather than a failure.
    pub fn is_closed(&self) -> bool {
        matches!(self, ReadError::Closed)
    }
}

impl From<io::Error> for ReadError {
    fn from(value: io::Error) -> Self {
        ReadError::IoError(value)
    }
}

impl Display for ReadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadError::IoError(error) => write!(f, "{}", error),
            ReadError::Closed => write!(f, "Connection closed by peer"),
            ReadError::InvalidProtocolId(id) => write!(f, "Invalid protocol id {}", id),
            ReadError::InvalidLength(length) => {
                write!(f, "Invalid length {} in frame header", length)
            }
            ReadError::InvalidFormat(format) => write!(f, "{}", format),
        }
    }
}

impl Error for ReadError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ReadError::IoError(error) => Some(error),
            _ => None,
        }
    }
}
