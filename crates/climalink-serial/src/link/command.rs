//! Command sender.
//!
//! A command is a single token followed by the configured line ending.
//! Each send takes the write channel, writes once, flushes and releases.
//! There is no queue, retry or acknowledgement.

use crate::link::error::{LinkError, TransportError};
use crate::link::transport::SerialTransport;
use crate::link::types::{LineEnding, SerialConfig};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    token: String,
}

impl Command {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Wire bytes: UTF-8 token plus line ending.
    pub fn encode(&self, ending: LineEnding) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.token.len() + 2);
        bytes.extend_from_slice(self.token.as_bytes());
        bytes.extend_from_slice(ending.bytes());
        bytes
    }
}

/// Per-send settings derived from the link configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandOptions {
    pub line_ending: LineEnding,
    /// `None` waits for the write indefinitely.
    pub write_timeout: Option<Duration>,
}

impl From<&SerialConfig> for CommandOptions {
    fn from(config: &SerialConfig) -> Self {
        Self {
            line_ending: config.line_ending,
            write_timeout: config.write_timeout_ms.map(Duration::from_millis),
        }
    }
}

/// Write `command` to `port` exactly once.  Returns the bytes written.
pub async fn send_command(
    port: &dyn SerialTransport,
    command: &Command,
    options: &CommandOptions,
) -> Result<usize, LinkError> {
    let mut channel = port
        .writable()
        .map_err(LinkError::write)?
        .ok_or_else(|| LinkError::write(TransportError::NotOpen(port.port_name().to_string())))?;

    let bytes = command.encode(options.line_ending);
    let write = async {
        channel.write_all(&bytes).await?;
        channel.flush().await
    };
    let result = match options.write_timeout {
        Some(limit) => match tokio::time::timeout(limit, write).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::TimedOut(limit.as_millis() as u64)),
        },
        None => write.await,
    };
    result.map_err(LinkError::write)?;
    Ok(bytes.len())
}
