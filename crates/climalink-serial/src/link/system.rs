//! OS serial backend built on the `serialport` crate.
//!
//! `serialport` is blocking, so every read and write runs on the tokio
//! blocking pool.  Reads use their own `try_clone`d handle with a short
//! poll timeout and loop until data, end of stream or a hard error.
//! Closing waits for any blocking call still holding a handle.

use crate::link::error::TransportError;
use crate::link::ports;
use crate::link::transport::{
    ChannelGuard, PortLocks, ReadChannel, SerialBackend, SerialTransport, WriteChannel,
};
use crate::link::types::{SerialConfig, SerialPortInfo, BAUD_RATE};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Poll interval of a blocking read.
const POLL_INTERVAL_MS: u64 = 100;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Device selection
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Lets the user pick one of the discovered ports.
pub trait PortSelector: Send + Sync {
    /// Return the chosen port name, or `None` if the user cancelled.
    fn select(&self, ports: &[SerialPortInfo]) -> Option<String>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Backend
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct SystemBackend {
    selector: Arc<dyn PortSelector>,
}

impl SystemBackend {
    pub fn new(selector: Arc<dyn PortSelector>) -> Self {
        Self { selector }
    }
}

fn join_error(e: tokio::task::JoinError) -> TransportError {
    TransportError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
}

#[async_trait::async_trait]
impl SerialBackend for SystemBackend {
    async fn request_port(&self) -> Result<Option<String>, TransportError> {
        let found = tokio::task::spawn_blocking(ports::scan_ports)
            .await
            .map_err(join_error)??;
        log::debug!("[link] {} port(s) available for selection", found.len());
        Ok(self.selector.select(&found))
    }

    async fn open(
        &self,
        port_name: &str,
        config: &SerialConfig,
    ) -> Result<Arc<dyn SerialTransport>, TransportError> {
        let name = port_name.to_string();
        let port = tokio::task::spawn_blocking(move || {
            serialport::new(&name, BAUD_RATE)
                .data_bits(DataBits::Eight)
                .parity(Parity::None)
                .stop_bits(StopBits::One)
                .flow_control(FlowControl::None)
                .timeout(Duration::from_millis(POLL_INTERVAL_MS))
                .open()
        })
        .await
        .map_err(join_error)??;

        log::info!("[link] opened {} at {}", port_name, config.shorthand());
        let transport: Arc<dyn SerialTransport> =
            Arc::new(SystemPort::new(port_name, port, config.read_buffer_size)?);
        Ok(transport)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Blocking slot
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

type BlockingJob<T> = JoinHandle<(Box<dyn SerialPort>, std::io::Result<T>)>;

/// One direction of the port: either the idle handle, or the blocking
/// job that currently owns it.
///
/// A job whose caller went away stays here until it is resumed, drained
/// or awaited by `shutdown`, so the handle is never dropped while the OS
/// call is still running.
enum Slot<T> {
    Idle(Box<dyn SerialPort>),
    Busy(BlockingJob<T>),
    Closed,
}

impl<T: Send + 'static> Slot<T> {
    /// Run `op` on the blocking pool, or pick up an abandoned run of it.
    /// Cancel-safe: dropping the future leaves the job in the slot.
    async fn run<F>(&mut self, op: F) -> Result<T, TransportError>
    where
        F: FnOnce(&mut Box<dyn SerialPort>) -> std::io::Result<T> + Send + 'static,
    {
        if let Slot::Idle(_) = self {
            if let Slot::Idle(mut port) = std::mem::replace(self, Slot::Closed) {
                *self = Slot::Busy(tokio::task::spawn_blocking(move || {
                    let result = op(&mut port);
                    (port, result)
                }));
            }
        }
        let joined = match self {
            Slot::Busy(job) => job.await,
            _ => return Err(TransportError::Closed),
        };
        *self = Slot::Closed;
        let (port, result) = joined.map_err(join_error)?;
        *self = Slot::Idle(port);
        Ok(result?)
    }

    /// Wait for an abandoned job, discarding its result.
    async fn drain(&mut self) -> Result<(), TransportError> {
        let joined = match self {
            Slot::Busy(job) => job.await,
            _ => return Ok(()),
        };
        *self = Slot::Closed;
        let (port, _) = joined.map_err(join_error)?;
        *self = Slot::Idle(port);
        Ok(())
    }

    /// Drain, then drop the handle.
    async fn shutdown(&mut self) {
        if let Err(e) = self.drain().await {
            log::warn!("[link] blocking serial task failed: {}", e);
        }
        *self = Slot::Closed;
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Port
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct SystemPort {
    name: String,
    open: AtomicBool,
    reader: Arc<Mutex<Slot<Vec<u8>>>>,
    writer: Arc<Mutex<Slot<()>>>,
    locks: PortLocks,
    /// Set once a read hits end of stream or a hard error.
    lost: Arc<AtomicBool>,
    read_buffer_size: usize,
}

impl SystemPort {
    /// Wrap an opened handle.  Reads go through a `try_clone`d handle.
    fn new(
        name: &str,
        port: Box<dyn SerialPort>,
        read_buffer_size: usize,
    ) -> Result<Self, TransportError> {
        let read_handle = port.try_clone()?;
        Ok(Self {
            name: name.to_string(),
            open: AtomicBool::new(true),
            reader: Arc::new(Mutex::new(Slot::Idle(read_handle))),
            writer: Arc::new(Mutex::new(Slot::Idle(port))),
            locks: PortLocks::new(),
            lost: Arc::new(AtomicBool::new(false)),
            read_buffer_size: read_buffer_size.max(1),
        })
    }
}

#[async_trait::async_trait]
impl SerialTransport for SystemPort {
    fn port_name(&self) -> &str {
        &self.name
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn readable(&self) -> Result<Option<Box<dyn ReadChannel>>, TransportError> {
        if !self.is_open() || self.lost.load(Ordering::SeqCst) {
            return Ok(None);
        }
        let guard = self.locks.read.try_acquire()?;
        let channel: Box<dyn ReadChannel> = Box::new(SystemReadChannel {
            slot: self.reader.clone(),
            buffer_size: self.read_buffer_size,
            lost: self.lost.clone(),
            _guard: guard,
        });
        Ok(Some(channel))
    }

    fn writable(&self) -> Result<Option<Box<dyn WriteChannel>>, TransportError> {
        if !self.is_open() {
            return Ok(None);
        }
        let guard = self.locks.write.try_acquire()?;
        let channel: Box<dyn WriteChannel> = Box::new(SystemWriteChannel {
            slot: self.writer.clone(),
            _guard: guard,
        });
        Ok(Some(channel))
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.locks.ensure_released()?;
        self.open.store(false, Ordering::SeqCst);
        self.lost.store(true, Ordering::SeqCst);
        // An abandoned read returns within one poll interval.
        self.reader.lock().await.shutdown().await;
        self.writer.lock().await.shutdown().await;
        log::info!("[link] closed {}", self.name);
        Ok(())
    }
}

struct SystemReadChannel {
    slot: Arc<Mutex<Slot<Vec<u8>>>>,
    buffer_size: usize,
    lost: Arc<AtomicBool>,
    _guard: ChannelGuard,
}

#[async_trait::async_trait]
impl ReadChannel for SystemReadChannel {
    async fn read(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        let mut slot = self.slot.lock().await;
        loop {
            let size = self.buffer_size;
            let result = slot
                .run(move |port| {
                    let mut buf = vec![0u8; size];
                    let n = port.read(&mut buf)?;
                    buf.truncate(n);
                    Ok(buf)
                })
                .await;

            match result {
                Ok(buf) if buf.is_empty() => {
                    self.lost.store(true, Ordering::SeqCst);
                    return Ok(None);
                }
                Ok(buf) => return Ok(Some(buf)),
                Err(TransportError::Io(e)) if e.kind() == std::io::ErrorKind::TimedOut => {}
                Err(TransportError::Closed) => return Ok(None),
                Err(e) => {
                    self.lost.store(true, Ordering::SeqCst);
                    return Err(e);
                }
            }
        }
    }
}

struct SystemWriteChannel {
    slot: Arc<Mutex<Slot<()>>>,
    _guard: ChannelGuard,
}

#[async_trait::async_trait]
impl WriteChannel for SystemWriteChannel {
    async fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let mut slot = self.slot.lock().await;
        // A write abandoned by a timeout must land before the next one starts.
        slot.drain().await?;
        let data = data.to_vec();
        slot.run(move |port| port.write_all(&data).and_then(|_| port.flush()))
            .await
    }
}
