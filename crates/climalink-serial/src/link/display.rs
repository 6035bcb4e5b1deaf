//! Display sink: the UI surface the link reports to.
//!
//! The link never renders anything itself.  It emits [`DisplayEvent`]s
//! into a [`DisplaySink`]; front ends decide how to show them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;
use tokio::sync::mpsc;

/// Status line contents, keyed to lifecycle events and error conditions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "camelCase")]
pub enum Status {
    NotConnected,
    Connected(String),
    ConnectionFailed(String),
    /// Connect requested while a session is already open.
    AlreadyConnected(String),
    ReadFailed(String),
    /// The port stopped producing data; the session stays open.
    StreamEnded(String),
    /// A command was attempted while disconnected.
    Rejected,
    CommandSent(String),
    CommandFailed(String),
}

impl Status {
    /// Whether this status reports a failure.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed(_)
                | Self::AlreadyConnected(_)
                | Self::ReadFailed(_)
                | Self::StreamEnded(_)
                | Self::CommandFailed(_)
                | Self::Rejected
        )
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "Status: not connected"),
            Self::Connected(port) => write!(f, "Status: connected to {}", port),
            Self::ConnectionFailed(msg) => write!(f, "Connection error: {}", msg),
            Self::AlreadyConnected(port) => write!(f, "Already connected to {}", port),
            Self::ReadFailed(msg) => write!(f, "Read error: {}", msg),
            Self::StreamEnded(port) => {
                write!(f, "No more data from {}, disconnect and reconnect", port)
            }
            Self::Rejected => write!(f, "Not connected to the board! Please connect first."),
            Self::CommandSent(token) => write!(f, "Sent command {}", token),
            Self::CommandFailed(msg) => write!(f, "Command error: {}", msg),
        }
    }
}

/// One update for the UI surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum DisplayEvent {
    Status(Status),
    /// Latest temperature text, verbatim from the board.
    Temperature(String),
    /// Latest humidity text, verbatim from the board.
    Humidity(String),
    /// Enable or disable the command controls.
    Controls { enabled: bool },
}

/// Receiver of display events.  Called from the reader task and from the
/// controller, so it must be cheap and non-blocking.
pub trait DisplaySink: Send + Sync {
    fn emit(&self, event: DisplayEvent);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Display state
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What a display currently shows.  Only the latest value per field is kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayState {
    pub status: Status,
    pub temperature: Option<String>,
    pub humidity: Option<String>,
    pub controls_enabled: bool,
}

impl Default for DisplayState {
    fn default() -> Self {
        Self {
            status: Status::NotConnected,
            temperature: None,
            humidity: None,
            controls_enabled: false,
        }
    }
}

impl DisplayState {
    pub fn apply(&mut self, event: &DisplayEvent) {
        match event {
            DisplayEvent::Status(s) => self.status = s.clone(),
            DisplayEvent::Temperature(t) => self.temperature = Some(t.clone()),
            DisplayEvent::Humidity(h) => self.humidity = Some(h.clone()),
            DisplayEvent::Controls { enabled } => self.controls_enabled = *enabled,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Sinks
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Forwards events to an async consumer (e.g. a terminal renderer).
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<DisplayEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DisplayEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl DisplaySink for ChannelSink {
    fn emit(&self, event: DisplayEvent) {
        // Receiver gone means the front end is shutting down.
        let _ = self.tx.send(event);
    }
}

/// Keeps the event history and the resulting display state.
#[derive(Default)]
pub struct RecordingSink {
    inner: Mutex<(Vec<DisplayEvent>, DisplayState)>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DisplayEvent> {
        self.lock().0.clone()
    }

    pub fn state(&self) -> DisplayState {
        self.lock().1.clone()
    }

    /// All status updates in order.
    pub fn statuses(&self) -> Vec<Status> {
        self.lock()
            .0
            .iter()
            .filter_map(|e| match e {
                DisplayEvent::Status(s) => Some(s.clone()),
                _ => None,
            })
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, (Vec<DisplayEvent>, DisplayState)> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl DisplaySink for RecordingSink {
    fn emit(&self, event: DisplayEvent) {
        let mut inner = self.lock();
        inner.1.apply(&event);
        inner.0.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_keeps_latest_per_field() {
        let mut state = DisplayState::default();
        state.apply(&DisplayEvent::Temperature("20".into()));
        state.apply(&DisplayEvent::Humidity("50".into()));
        state.apply(&DisplayEvent::Temperature("21".into()));
        assert_eq!(state.temperature.as_deref(), Some("21"));
        assert_eq!(state.humidity.as_deref(), Some("50"));
        assert_eq!(state.status, Status::NotConnected);
    }

    #[test]
    fn test_status_text() {
        assert_eq!(Status::NotConnected.to_string(), "Status: not connected");
        assert_eq!(
            Status::Connected("/dev/ttyACM0".into()).to_string(),
            "Status: connected to /dev/ttyACM0"
        );
        assert_eq!(Status::CommandSent("LED_ON".into()).to_string(), "Sent command LED_ON");
        assert_eq!(
            Status::AlreadyConnected("COM3".into()).to_string(),
            "Already connected to COM3"
        );
        assert!(Status::StreamEnded("COM3".into()).is_error());
        assert!(Status::Rejected.is_error());
        assert!(!Status::CommandSent("X".into()).is_error());
    }

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_string(&DisplayEvent::Temperature("25.5".into())).unwrap();
        assert_eq!(json, r#"{"type":"temperature","payload":"25.5"}"#);

        let json = serde_json::to_string(&DisplayEvent::Controls { enabled: true }).unwrap();
        assert_eq!(json, r#"{"type":"controls","payload":{"enabled":true}}"#);

        let json = serde_json::to_string(&DisplayEvent::Status(Status::NotConnected)).unwrap();
        assert_eq!(json, r#"{"type":"status","payload":{"kind":"notConnected"}}"#);
    }

    #[tokio::test]
    async fn test_channel_sink_forwards() {
        let (sink, mut rx) = ChannelSink::new();
        sink.emit(DisplayEvent::Humidity("60".into()));
        assert_eq!(rx.recv().await, Some(DisplayEvent::Humidity("60".into())));
        drop(rx);
        // Emitting after the receiver is gone is silently ignored.
        sink.emit(DisplayEvent::Humidity("61".into()));
    }
}
