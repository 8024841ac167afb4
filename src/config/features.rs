//! Feature flags configuration
//!
//! Feature flags for optional modules (opt-out: default enabled).

use serde::Deserialize;

/// Feature flags for optional modules (opt-out: default enabled)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Features {
    /// Event journal: write dashboard events to JSONL files
    pub journal: bool,

    /// Refresh stats and report lists when a scan completes
    pub refresh_on_complete: bool,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            journal: true,
            refresh_on_complete: true,
        }
    }
}

/// Feature flags as loaded from config file
#[derive(Debug, Deserialize, Default)]
pub struct FileFeatures {
    pub journal: Option<bool>,
    pub refresh_on_complete: Option<bool>,
}

impl Features {
    /// Create from file config with defaults
    pub fn from_file(file: Option<FileFeatures>) -> Self {
        let file = file.unwrap_or_default();

        Self {
            journal: file.journal.unwrap_or(true),
            refresh_on_complete: file.refresh_on_complete.unwrap_or(true),
        }
    }
}
