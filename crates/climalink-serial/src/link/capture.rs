//! Traffic capture.
//!
//! Appends one timestamped line per received chunk or sent command to a
//! file, e.g. `2026-10-16 12:00:00.000 <<< T25.5 H60`.  Capture failures
//! are logged and never interrupt the link.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DataDirection {
    Tx,
    Rx,
}

impl DataDirection {
    pub fn arrow(&self) -> &'static str {
        match self {
            Self::Tx => ">>>",
            Self::Rx => "<<<",
        }
    }
}

/// A single captured chunk or command.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureEntry {
    pub timestamp: DateTime<Utc>,
    pub direction: DataDirection,
    pub text: String,
}

impl CaptureEntry {
    pub fn new(direction: DataDirection, text: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            direction,
            text: text.into(),
        }
    }

    /// One line, with embedded line breaks escaped.
    pub fn format_line(&self) -> String {
        let text = self.text.replace('\r', "\\r").replace('\n', "\\n");
        format!(
            "{} {} {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            self.direction.arrow(),
            text
        )
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Capture file
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct TrafficCapture {
    path: PathBuf,
    file: Mutex<File>,
}

impl TrafficCapture {
    /// Open `path` for appending, creating parent directories.
    pub fn open(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Session banner written on connect.
    pub fn write_header(&self, session_id: &str, port_name: &str, settings: &str) {
        let line = format!(
            "# session {} on {} ({}) started {}",
            session_id,
            port_name,
            settings,
            Utc::now().format("%Y-%m-%d %H:%M:%S")
        );
        self.write_line(&line);
    }

    pub fn record(&self, direction: DataDirection, text: &str) {
        self.write_line(&CaptureEntry::new(direction, text).format_line());
    }

    fn write_line(&self, line: &str) {
        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = writeln!(file, "{}", line) {
            log::warn!("[capture] write to {} failed: {}", self.path.display(), e);
        }
    }
}
