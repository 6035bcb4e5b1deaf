//! Transport session: one open port plus its reader task.
//!
//! A session is created on connect and consumed by [`Session::close`].
//! Close order is fixed: cancel the reader, wait for it to drop its read
//! channel, then close the port.

use crate::link::capture::{DataDirection, TrafficCapture};
use crate::link::command::{send_command, Command, CommandOptions};
use crate::link::display::DisplaySink;
use crate::link::error::{LinkError, LinkResult};
use crate::link::reader::{run_reader, ReaderContext, ReaderExit};
use crate::link::transport::{SerialBackend, SerialTransport};
use crate::link::types::{LinkCounters, LinkInfo, LinkStatus, SerialConfig};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct Session {
    id: String,
    port: Arc<dyn SerialTransport>,
    shorthand: String,
    options: CommandOptions,
    token: CancellationToken,
    reader: Option<JoinHandle<ReaderExit>>,
    counters: Arc<LinkCounters>,
    capture: Option<Arc<TrafficCapture>>,
    connected_at: DateTime<Utc>,
}

impl Session {
    /// Pick a device (unless `port_name` is given), open it and start
    /// the reader task.
    pub async fn open(
        backend: &dyn SerialBackend,
        port_name: Option<&str>,
        config: &SerialConfig,
        sink: Arc<dyn DisplaySink>,
    ) -> LinkResult<Self> {
        let port_name = match port_name {
            Some(name) => name.to_string(),
            None => backend
                .request_port()
                .await
                .map_err(LinkError::connection)?
                .ok_or_else(|| LinkError::connection("no port selected"))?,
        };
        let port = backend
            .open(&port_name, config)
            .await
            .map_err(LinkError::connection)?;

        let id = uuid::Uuid::new_v4().to_string();
        let shorthand = config.shorthand();
        let capture = config.capture_path.as_deref().and_then(|path| {
            match TrafficCapture::open(path) {
                Ok(capture) => {
                    capture.write_header(&id, &port_name, &shorthand);
                    Some(Arc::new(capture))
                }
                Err(e) => {
                    log::warn!("[link:{}] capture disabled, cannot open {}: {}", id, path.display(), e);
                    None
                }
            }
        });

        let token = CancellationToken::new();
        let counters = Arc::new(LinkCounters::default());
        let reader = tokio::spawn(run_reader(ReaderContext {
            session_id: id.clone(),
            port: port.clone(),
            token: token.clone(),
            sink,
            counters: counters.clone(),
            capture: capture.clone(),
        }));

        log::info!("[link:{}] session open on {} ({})", id, port_name, shorthand);
        Ok(Self {
            id,
            port,
            shorthand,
            options: CommandOptions::from(config),
            token,
            reader: Some(reader),
            counters,
            capture,
            connected_at: Utc::now(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn port_name(&self) -> &str {
        self.port.port_name()
    }

    /// Whether the port can still take commands.
    pub fn is_writable(&self) -> bool {
        self.port.is_open()
    }

    /// Whether the reader task is still running.
    pub fn is_reading(&self) -> bool {
        self.reader.as_ref().map_or(false, |h| !h.is_finished())
    }

    /// Send one command over the port.
    pub async fn send(&self, command: &Command) -> LinkResult<usize> {
        let written = send_command(self.port.as_ref(), command, &self.options).await?;
        self.counters.record_tx(written);
        if let Some(capture) = &self.capture {
            capture.record(DataDirection::Tx, command.token());
        }
        log::debug!("[link:{}] sent {:?} ({} bytes)", self.id, command.token(), written);
        Ok(written)
    }

    pub fn info(&self) -> LinkInfo {
        LinkInfo {
            status: LinkStatus::Connected,
            session_id: Some(self.id.clone()),
            port_name: Some(self.port_name().to_string()),
            config_shorthand: self.shorthand.clone(),
            connected_at: Some(self.connected_at),
            reading: self.is_reading(),
            stats: self.counters.snapshot(),
        }
    }

    /// Stop the reader and close the port.
    pub async fn close(mut self) -> LinkResult<()> {
        self.token.cancel();
        if let Some(handle) = self.reader.take() {
            match handle.await {
                Ok(exit) => log::debug!("[link:{}] reader finished: {:?}", self.id, exit),
                Err(e) => log::warn!("[link:{}] reader task failed: {}", self.id, e),
            }
        }
        self.port.close().await.map_err(LinkError::connection)?;
        log::info!("[link:{}] session closed", self.id);
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
