// Event journal - writes every DashboardEvent to disk in JSON Lines format
//
// One JSON object per line, so a session can be replayed or inspected with
// standard tools:
//
//   jq 'select(.type == "console_line") | .line' logs/cerberus-20250301-101500-a7b3.jsonl
//
// Each session gets its own file: cerberus-YYYYMMDD-HHMMSS-XXXX.jsonl

use crate::events::DashboardEvent;
use anyhow::{Context, Result};
use chrono::Local;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tokio::sync::broadcast::{self, error::RecvError};

/// Session identifier used in journal file names
pub fn new_session_id() -> String {
    let suffix = std::process::id() as u64 ^ Local::now().timestamp_subsec_nanos() as u64;
    format!(
        "{}-{:04x}",
        Local::now().format("%Y%m%d-%H%M%S"),
        suffix & 0xffff
    )
}

/// Appends dashboard events to a JSON Lines file
pub struct EventJournal {
    path: PathBuf,
    writer: BufWriter<File>,
    event_rx: broadcast::Receiver<DashboardEvent>,
}

impl EventJournal {
    /// Create the journal file under `log_dir`
    pub fn new(
        log_dir: &Path,
        session_id: &str,
        event_rx: broadcast::Receiver<DashboardEvent>,
    ) -> Result<Self> {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;

        let path = log_dir.join(format!("cerberus-{}.jsonl", session_id));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open journal {}", path.display()))?;

        Ok(Self {
            path,
            writer: BufWriter::new(file),
            event_rx,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write events until the bus closes
    ///
    /// A lagging journal skips what it missed and records the gap.
    pub async fn run(mut self) -> Result<()> {
        tracing::info!("Event journal started: {}", self.path.display());

        loop {
            match self.event_rx.recv().await {
                Ok(event) => {
                    if let Err(e) = self.write_event(&event) {
                        tracing::error!("Failed to write event: {:?}", e);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Event journal lagged; {} events not recorded", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }

        self.writer.flush().context("Failed to flush journal")?;
        tracing::info!("Event journal closed");
        Ok(())
    }

    fn write_event(&mut self, event: &DashboardEvent) -> Result<()> {
        let json = serde_json::to_string(event).context("Failed to serialize event")?;
        writeln!(self.writer, "{}", json).context("Failed to write to journal")?;
        // Visible even if the process dies mid-scan
        self.writer.flush().context("Failed to flush journal")?;
        Ok(())
    }
}
