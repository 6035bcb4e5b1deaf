//! Error types for the serial link.

use thiserror::Error;

/// Backend-level failures: opening ports, acquiring channels, raw I/O.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("port {0} not found")]
    PortNotFound(String),
    #[error("port {0} is not open")]
    NotOpen(String),
    #[error("{0} channel is locked")]
    ChannelLocked(&'static str),
    #[error("operation timed out after {0} ms")]
    TimedOut(u64),
    #[error("port closed")]
    Closed,
    #[error("serial error: {0}")]
    Serial(#[from] serialport::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Link errors surfaced to the user as status text.
#[derive(Debug, Error)]
pub enum LinkError {
    /// Device selection cancelled or the port failed to open.
    #[error("connection error: {0}")]
    Connection(String),
    /// A read failed for a reason other than a requested disconnect.
    #[error("read error: {0}")]
    Read(String),
    /// A command write failed; the command is lost.
    #[error("write error: {0}")]
    Write(String),
    #[error("already connected to {0}")]
    AlreadyConnected(String),
}

impl LinkError {
    pub fn connection(e: impl std::fmt::Display) -> Self {
        Self::Connection(e.to_string())
    }

    pub fn read(e: impl std::fmt::Display) -> Self {
        Self::Read(e.to_string())
    }

    pub fn write(e: impl std::fmt::Display) -> Self {
        Self::Write(e.to_string())
    }

    /// The message without the category prefix, for status lines.
    pub fn detail(&self) -> &str {
        match self {
            Self::Connection(m) | Self::Read(m) | Self::Write(m) | Self::AlreadyConnected(m) => m,
        }
    }
}

/// Convenience Result alias.
pub type LinkResult<T> = Result<T, LinkError>;

/// Front ends take plain strings as command results.
impl From<LinkError> for String {
    fn from(e: LinkError) -> Self {
        e.to_string()
    }
}
