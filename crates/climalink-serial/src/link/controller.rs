//! Link controller.
//!
//! Finite-state dispatcher behind every user action.  All lifecycle and
//! command operations take the state lock, so a send that races a
//! disconnect either finishes first or sees `Disconnected`.

use crate::link::command::Command;
use crate::link::display::{DisplayEvent, DisplaySink, Status};
use crate::link::error::{LinkError, LinkResult};
use crate::link::session::Session;
use crate::link::transport::SerialBackend;
use crate::link::types::{LinkInfo, LinkStatus, SerialConfig};
use std::sync::Arc;
use tokio::sync::Mutex;

enum LinkState {
    Disconnected,
    Connected(Session),
}

/// Result of a command request that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Written to the port; carries the byte count.
    Sent(usize),
    /// No session; nothing was written.
    Rejected,
}

pub struct LinkController {
    backend: Arc<dyn SerialBackend>,
    sink: Arc<dyn DisplaySink>,
    config: SerialConfig,
    state: Mutex<LinkState>,
}

impl LinkController {
    pub fn new(
        backend: Arc<dyn SerialBackend>,
        sink: Arc<dyn DisplaySink>,
        config: SerialConfig,
    ) -> Self {
        Self {
            backend,
            sink,
            config,
            state: Mutex::new(LinkState::Disconnected),
        }
    }

    fn status(&self, status: Status) {
        self.sink.emit(DisplayEvent::Status(status));
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    //  Lifecycle
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Ask the backend for a device and connect to it.
    pub async fn connect(&self) -> LinkResult<()> {
        self.open_session(None).await
    }

    /// Connect to a known port without going through the picker.
    pub async fn connect_to(&self, port_name: &str) -> LinkResult<()> {
        self.open_session(Some(port_name)).await
    }

    async fn open_session(&self, port_name: Option<&str>) -> LinkResult<()> {
        let mut state = self.state.lock().await;
        if let LinkState::Connected(session) = &*state {
            log::warn!("[link] connect refused, already on {}", session.port_name());
            self.status(Status::AlreadyConnected(session.port_name().to_string()));
            return Err(LinkError::AlreadyConnected(session.port_name().to_string()));
        }

        match Session::open(self.backend.as_ref(), port_name, &self.config, self.sink.clone()).await {
            Ok(session) => {
                self.status(Status::Connected(session.port_name().to_string()));
                self.sink.emit(DisplayEvent::Controls { enabled: true });
                *state = LinkState::Connected(session);
                Ok(())
            }
            Err(e) => {
                log::error!("[link] {}", e);
                self.status(Status::ConnectionFailed(e.detail().to_string()));
                Err(e)
            }
        }
    }

    /// Close the session.  Without one this only reports "not connected".
    pub async fn disconnect(&self) -> LinkResult<()> {
        let mut state = self.state.lock().await;
        let session = match std::mem::replace(&mut *state, LinkState::Disconnected) {
            LinkState::Connected(session) => session,
            LinkState::Disconnected => {
                log::debug!("[link] disconnect without a session");
                self.status(Status::NotConnected);
                return Ok(());
            }
        };

        let result = session.close().await;
        if let Err(e) = &result {
            log::error!("[link] {}", e);
        }
        self.sink.emit(DisplayEvent::Controls { enabled: false });
        self.status(Status::NotConnected);
        result
    }

    /// Connect when disconnected, disconnect when connected.
    pub async fn toggle(&self) -> LinkResult<()> {
        if self.is_connected().await {
            self.disconnect().await
        } else {
            self.connect().await
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    //  Commands
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Send `token` once.  Without a writable session the request is
    /// rejected with a status message and nothing is written.
    pub async fn send_command(&self, token: &str) -> LinkResult<SendOutcome> {
        let state = self.state.lock().await;
        let session = match &*state {
            LinkState::Connected(session) if session.is_writable() => session,
            _ => {
                log::warn!("[link] command {:?} rejected, not connected", token);
                self.status(Status::Rejected);
                return Ok(SendOutcome::Rejected);
            }
        };

        match session.send(&Command::new(token)).await {
            Ok(written) => {
                self.status(Status::CommandSent(token.to_string()));
                Ok(SendOutcome::Sent(written))
            }
            Err(e) => {
                log::error!("[link:{}] {}", session.id(), e);
                self.status(Status::CommandFailed(e.detail().to_string()));
                Err(e)
            }
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    //  Queries
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub async fn is_connected(&self) -> bool {
        matches!(&*self.state.lock().await, LinkState::Connected(_))
    }

    pub async fn info(&self) -> LinkInfo {
        match &*self.state.lock().await {
            LinkState::Connected(session) => session.info(),
            LinkState::Disconnected => LinkInfo {
                status: LinkStatus::Disconnected,
                session_id: None,
                port_name: None,
                config_shorthand: self.config.shorthand(),
                connected_at: None,
                reading: false,
                stats: Default::default(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::display::RecordingSink;
    use crate::link::simulated::{SimulatedBackend, SimulatedPort};
    use crate::link::transport::SerialTransport;
    use std::time::Duration;

    fn controller() -> (LinkController, Arc<SimulatedBackend>, Arc<RecordingSink>) {
        let backend = Arc::new(SimulatedBackend::new(SimulatedPort::new("SIM0")));
        let sink = Arc::new(RecordingSink::new());
        let ctl = LinkController::new(backend.clone(), sink.clone(), SerialConfig::default());
        (ctl, backend, sink)
    }

    #[tokio::test]
    async fn test_connect_enables_controls() {
        let (ctl, _backend, sink) = controller();
        ctl.connect().await.unwrap();
        assert!(ctl.is_connected().await);

        let state = sink.state();
        assert!(state.controls_enabled);
        assert_eq!(state.status, Status::Connected("SIM0".into()));
        ctl.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_twice_refused() {
        let (ctl, _backend, sink) = controller();
        ctl.connect().await.unwrap();
        let err = ctl.connect().await.unwrap_err();
        assert!(matches!(err, LinkError::AlreadyConnected(ref p) if p == "SIM0"));
        assert!(ctl.is_connected().await);

        let state = sink.state();
        assert_eq!(state.status, Status::AlreadyConnected("SIM0".into()));
        assert!(state.controls_enabled);
        ctl.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_failure_stays_disconnected() {
        let (ctl, backend, sink) = controller();
        backend.set_fail_open(true);
        assert!(matches!(ctl.connect().await, Err(LinkError::Connection(_))));
        assert!(!ctl.is_connected().await);

        let state = sink.state();
        assert!(!state.controls_enabled);
        assert!(matches!(state.status, Status::ConnectionFailed(ref m) if m.contains("denied")));
    }

    #[tokio::test]
    async fn test_disconnect_without_session() {
        let (ctl, _backend, sink) = controller();
        ctl.disconnect().await.unwrap();
        assert_eq!(sink.statuses(), vec![Status::NotConnected]);
        assert!(!ctl.is_connected().await);
    }

    #[tokio::test]
    async fn test_send_rejected_when_disconnected() {
        let (ctl, backend, sink) = controller();
        assert_eq!(ctl.send_command("LED_ON").await.unwrap(), SendOutcome::Rejected);
        assert_eq!(sink.state().status, Status::Rejected);
        assert!(backend.port().writes().is_empty());
    }

    #[tokio::test]
    async fn test_send_failure_keeps_session() {
        let (ctl, backend, sink) = controller();
        ctl.connect().await.unwrap();
        backend.port().set_fail_writes(true);
        assert!(matches!(ctl.send_command("FAN_ON").await, Err(LinkError::Write(_))));
        assert!(matches!(sink.state().status, Status::CommandFailed(_)));
        assert!(ctl.is_connected().await);

        backend.port().set_fail_writes(false);
        assert_eq!(ctl.send_command("FAN_ON").await.unwrap(), SendOutcome::Sent(7));
        ctl.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_toggle_cycles() {
        let (ctl, backend, sink) = controller();
        ctl.toggle().await.unwrap();
        assert!(ctl.is_connected().await);
        ctl.toggle().await.unwrap();
        assert!(!ctl.is_connected().await);
        assert!(!backend.port().is_open());
        assert!(!sink.state().controls_enabled);
    }

    #[tokio::test]
    async fn test_info_reflects_state() {
        let (ctl, _backend, _sink) = controller();
        let info = ctl.info().await;
        assert_eq!(info.status, LinkStatus::Disconnected);
        assert!(info.session_id.is_none());

        ctl.connect().await.unwrap();
        let info = ctl.info().await;
        assert_eq!(info.status, LinkStatus::Connected);
        assert_eq!(info.port_name.as_deref(), Some("SIM0"));
        assert!(info.connected_at.is_some());
        ctl.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_send_racing_disconnect_completes_first() {
        let (ctl, backend, _sink) = controller();
        ctl.connect().await.unwrap();
        backend.port().set_write_delay(Duration::from_millis(30));

        let (sent, closed) = tokio::join!(ctl.send_command("LED_ON"), ctl.disconnect());
        assert_eq!(sent.unwrap(), SendOutcome::Sent(7));
        // Close would fail with ChannelLocked had the write still been running.
        closed.unwrap();
        assert_eq!(backend.port().writes(), vec![b"LED_ON\n".to_vec()]);
        assert!(!backend.port().is_open());
    }

    #[tokio::test]
    async fn test_send_racing_disconnect_is_rejected_after() {
        let (ctl, backend, sink) = controller();
        ctl.connect().await.unwrap();
        backend.port().set_write_delay(Duration::from_millis(30));

        let (closed, sent) = tokio::join!(ctl.disconnect(), ctl.send_command("LED_ON"));
        closed.unwrap();
        assert_eq!(sent.unwrap(), SendOutcome::Rejected);
        assert!(backend.port().writes().is_empty());
        assert_eq!(sink.state().status, Status::Rejected);
    }
}
