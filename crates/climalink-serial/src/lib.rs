//! # climalink: serial link
//!
//! Talks to a temperature / humidity board over a 9600 baud serial line:
//!
//! - **Port Discovery**: enumerate ports and label common boards by VID/PID
//! - **Transport**: async read/write channels over a port, with exclusive
//!   channel locks and an in-memory simulated backend
//! - **Reader Loop**: streaming UTF-8 decode of telemetry chunks, parsed
//!   into temperature / humidity display updates
//! - **Commands**: single-token commands written once per request
//! - **Controller**: connect / disconnect / send gated by session state
//! - **Capture**: optional timestamped traffic log

pub mod link;
