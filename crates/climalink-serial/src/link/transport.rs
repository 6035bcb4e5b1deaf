//! Serial port transport abstraction.
//!
//! An open port is a connection handle ([`SerialTransport`]) that hands
//! out one readable and one writable channel at a time.  Channel
//! exclusivity is tracked by [`ChannelLock`]; a channel releases its lock
//! when dropped, and a port refuses to close while either lock is held.
//! Backends ([`SerialBackend`]) cover device selection and opening.

use crate::link::error::TransportError;
use crate::link::types::SerialConfig;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Channel traits
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Raw readable side of an open port.
#[async_trait::async_trait]
pub trait ReadChannel: Send {
    /// Wait for the next raw chunk.  `Ok(None)` means end of stream.
    ///
    /// Callers race this against cancellation, so dropping the future
    /// must leave the channel in a droppable state.
    async fn read(&mut self) -> Result<Option<Vec<u8>>, TransportError>;
}

/// Raw writable side of an open port.
#[async_trait::async_trait]
pub trait WriteChannel: Send {
    /// Write every byte of `data`.
    async fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Flush pending output.
    async fn flush(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Transport / backend traits
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An open serial connection.
///
/// Implementations must be `Send + Sync` so they can be held behind an
/// `Arc` and shared between the reader task and the command path.
#[async_trait::async_trait]
pub trait SerialTransport: Send + Sync {
    /// Retrieve the port name.
    fn port_name(&self) -> &str;

    /// Check whether the port is open.
    fn is_open(&self) -> bool;

    /// Acquire the readable side.
    ///
    /// `Ok(None)` once the port can no longer produce a readable stream
    /// (closed, device lost).  `Err(ChannelLocked)` while another reader
    /// holds it.
    fn readable(&self) -> Result<Option<Box<dyn ReadChannel>>, TransportError>;

    /// Acquire the writable side.  Same contract as [`readable`](Self::readable).
    fn writable(&self) -> Result<Option<Box<dyn WriteChannel>>, TransportError>;

    /// Close the port.  Fails with `ChannelLocked` if a channel is still held.
    async fn close(&self) -> Result<(), TransportError>;
}

/// Device selection and port opening.
#[async_trait::async_trait]
pub trait SerialBackend: Send + Sync {
    /// Ask the user for a device.  `Ok(None)` means the user cancelled.
    async fn request_port(&self) -> Result<Option<String>, TransportError>;

    /// Open `port_name` at the fixed line settings.
    async fn open(
        &self,
        port_name: &str,
        config: &SerialConfig,
    ) -> Result<Arc<dyn SerialTransport>, TransportError>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Channel lock
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Exclusive-access flag for one channel of a port.
#[derive(Debug)]
pub struct ChannelLock {
    name: &'static str,
    held: Arc<AtomicBool>,
}

impl ChannelLock {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            held: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Take the lock, or fail if someone else holds it.
    pub fn try_acquire(&self) -> Result<ChannelGuard, TransportError> {
        self.held
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| TransportError::ChannelLocked(self.name))?;
        Ok(ChannelGuard {
            held: self.held.clone(),
        })
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Held by a live channel; releases the lock on drop.
#[derive(Debug)]
pub struct ChannelGuard {
    held: Arc<AtomicBool>,
}

impl Drop for ChannelGuard {
    fn drop(&mut self) {
        self.held.store(false, Ordering::SeqCst);
    }
}

/// Read + write locks of one port, with the close-ordering check.
#[derive(Debug)]
pub struct PortLocks {
    pub read: ChannelLock,
    pub write: ChannelLock,
}

impl PortLocks {
    pub fn new() -> Self {
        Self {
            read: ChannelLock::new("read"),
            write: ChannelLock::new("write"),
        }
    }

    /// Fails if either channel is still held.
    pub fn ensure_released(&self) -> Result<(), TransportError> {
        for lock in [&self.read, &self.write] {
            if lock.is_held() {
                return Err(TransportError::ChannelLocked(lock.name()));
            }
        }
        Ok(())
    }
}

impl Default for PortLocks {
    fn default() -> Self {
        Self::new()
    }
}
