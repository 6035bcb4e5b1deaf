//! In-memory serial backend for tests and the offline demo mode.
//!
//! [`SimulatedPort`] behaves like a real port from the link's point of
//! view: one readable and one writable channel at a time, end-of-stream
//! and fault injection, and a log of every write for assertions.

use crate::link::error::TransportError;
use crate::link::transport::{
    ChannelGuard, PortLocks, ReadChannel, SerialBackend, SerialTransport, WriteChannel,
};
use crate::link::types::SerialConfig;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

#[derive(Debug)]
enum SimRx {
    Data(Vec<u8>),
    EndOfStream,
    Error(String),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Simulated port
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A fully in-memory port.
pub struct SimulatedPort {
    name: String,
    open: AtomicBool,
    /// Cleared once the port can no longer produce a readable stream.
    readable_left: AtomicBool,
    fail_writes: AtomicBool,
    write_delay_ms: AtomicU64,
    locks: PortLocks,
    rx_in: mpsc::UnboundedSender<SimRx>,
    rx_out: Arc<Mutex<mpsc::UnboundedReceiver<SimRx>>>,
    writes: Arc<StdMutex<Vec<Vec<u8>>>>,
}

impl SimulatedPort {
    /// Create a closed port with the given name.
    pub fn new(port_name: impl Into<String>) -> Arc<Self> {
        let (rx_in, rx_out) = mpsc::unbounded_channel();
        Arc::new(Self {
            name: port_name.into(),
            open: AtomicBool::new(false),
            readable_left: AtomicBool::new(true),
            fail_writes: AtomicBool::new(false),
            write_delay_ms: AtomicU64::new(0),
            locks: PortLocks::new(),
            rx_in,
            rx_out: Arc::new(Mutex::new(rx_out)),
            writes: Arc::new(StdMutex::new(Vec::new())),
        })
    }

    fn reopen(&self) -> Result<(), TransportError> {
        if self.open.swap(true, Ordering::SeqCst) {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::AddrInUse,
                format!("port {} already open", self.name),
            )));
        }
        self.readable_left.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Simulate bytes arriving from the board.
    pub fn inject_rx(&self, data: &[u8]) {
        let _ = self.rx_in.send(SimRx::Data(data.to_vec()));
    }

    /// End the current readable stream; the port offers a fresh one after.
    pub fn end_stream(&self) {
        let _ = self.rx_in.send(SimRx::EndOfStream);
    }

    /// End the current readable stream for good (device unplugged).
    pub fn exhaust_readable(&self) {
        self.readable_left.store(false, Ordering::SeqCst);
        let _ = self.rx_in.send(SimRx::EndOfStream);
    }

    /// Make the next read fail.
    pub fn inject_read_error(&self, message: impl Into<String>) {
        let _ = self.rx_in.send(SimRx::Error(message.into()));
    }

    /// Make every write fail until reset.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Hold every write for `delay` before it lands.
    pub fn set_write_delay(&self, delay: Duration) {
        self.write_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Every successful write call, in order.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.writes.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// All written bytes concatenated.
    pub fn written_bytes(&self) -> Vec<u8> {
        self.writes().concat()
    }

    pub fn is_read_locked(&self) -> bool {
        self.locks.read.is_held()
    }

    pub fn is_write_locked(&self) -> bool {
        self.locks.write.is_held()
    }
}

#[async_trait::async_trait]
impl SerialTransport for SimulatedPort {
    fn port_name(&self) -> &str {
        &self.name
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn readable(&self) -> Result<Option<Box<dyn ReadChannel>>, TransportError> {
        if !self.is_open() || !self.readable_left.load(Ordering::SeqCst) {
            return Ok(None);
        }
        let guard = self.locks.read.try_acquire()?;
        let channel: Box<dyn ReadChannel> = Box::new(SimReadChannel {
            rx: self.rx_out.clone(),
            _guard: guard,
        });
        Ok(Some(channel))
    }

    fn writable(&self) -> Result<Option<Box<dyn WriteChannel>>, TransportError> {
        if !self.is_open() {
            return Ok(None);
        }
        let guard = self.locks.write.try_acquire()?;
        let channel: Box<dyn WriteChannel> = Box::new(SimWriteChannel {
            writes: self.writes.clone(),
            fail: self.fail_writes.load(Ordering::SeqCst),
            delay: Duration::from_millis(self.write_delay_ms.load(Ordering::SeqCst)),
            _guard: guard,
        });
        Ok(Some(channel))
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.locks.ensure_released()?;
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }
}

struct SimReadChannel {
    rx: Arc<Mutex<mpsc::UnboundedReceiver<SimRx>>>,
    _guard: ChannelGuard,
}

#[async_trait::async_trait]
impl ReadChannel for SimReadChannel {
    async fn read(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        let mut rx = self.rx.lock().await;
        match rx.recv().await {
            Some(SimRx::Data(data)) => Ok(Some(data)),
            Some(SimRx::EndOfStream) | None => Ok(None),
            Some(SimRx::Error(msg)) => Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                msg,
            ))),
        }
    }
}

struct SimWriteChannel {
    writes: Arc<StdMutex<Vec<Vec<u8>>>>,
    fail: bool,
    delay: Duration,
    _guard: ChannelGuard,
}

#[async_trait::async_trait]
impl WriteChannel for SimWriteChannel {
    async fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "device stopped accepting data",
            )));
        }
        self.writes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(data.to_vec());
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Simulated backend
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Backend exposing a single simulated device.
pub struct SimulatedBackend {
    port: Arc<SimulatedPort>,
    user_cancels: AtomicBool,
    fail_open: AtomicBool,
}

impl SimulatedBackend {
    pub fn new(port: Arc<SimulatedPort>) -> Self {
        Self {
            port,
            user_cancels: AtomicBool::new(false),
            fail_open: AtomicBool::new(false),
        }
    }

    /// The device behind this backend.
    pub fn port(&self) -> Arc<SimulatedPort> {
        self.port.clone()
    }

    /// Make the device picker report a cancelled selection.
    pub fn set_user_cancels(&self, cancels: bool) {
        self.user_cancels.store(cancels, Ordering::SeqCst);
    }

    /// Make opening the port fail.
    pub fn set_fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl SerialBackend for SimulatedBackend {
    async fn request_port(&self) -> Result<Option<String>, TransportError> {
        if self.user_cancels.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(Some(self.port.name.clone()))
    }

    async fn open(
        &self,
        port_name: &str,
        _config: &SerialConfig,
    ) -> Result<Arc<dyn SerialTransport>, TransportError> {
        if port_name != self.port.name {
            return Err(TransportError::PortNotFound(port_name.to_string()));
        }
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("access to {} denied", port_name),
            )));
        }
        self.port.reopen()?;
        let transport: Arc<dyn SerialTransport> = self.port.clone();
        Ok(transport)
    }
}
