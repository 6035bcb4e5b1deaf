//! climalink: terminal controller for a serial temperature / humidity board.
//!
//! The serial link itself lives in the `climalink-serial` crate; this
//! crate adds configuration, logging setup and the terminal front end.

pub mod config;
pub mod logging;
pub mod terminal;

pub use climalink_serial::link;
