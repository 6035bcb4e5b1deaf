//! Serial link: sub-modules.

pub mod types;
pub mod error;
pub mod transport;
pub mod decoder;
pub mod parser;
pub mod display;
pub mod capture;
pub mod reader;
pub mod command;
pub mod session;
pub mod controller;
pub mod ports;
pub mod system;
pub mod simulated;

// Re-export top-level items for convenience.
pub use types::*;
pub use error::{LinkError, LinkResult, TransportError};
pub use display::{ChannelSink, DisplayEvent, DisplaySink, DisplayState, RecordingSink, Status};
pub use controller::{LinkController, SendOutcome};
pub use transport::{SerialBackend, SerialTransport};
