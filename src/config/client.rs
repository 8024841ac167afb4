//! Client-side timing: HTTP timeouts and toast lifetime

use serde::Deserialize;
use std::time::Duration;

// ─────────────────────────────────────────────────────────────────────────────
// HTTP
// ─────────────────────────────────────────────────────────────────────────────

/// HTTP client timeouts
///
/// `request_timeout` applies to short JSON calls only. The scan stream never
/// times out on the client side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpConfig {
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// HTTP settings as loaded from config file
#[derive(Debug, Deserialize, Default)]
pub struct FileHttp {
    pub request_timeout_secs: Option<u64>,
    pub connect_timeout_secs: Option<u64>,
}

impl HttpConfig {
    /// Create from file config with defaults; zero values fall back to defaults
    pub fn from_file(file: Option<FileHttp>) -> Self {
        let file = file.unwrap_or_default();
        let defaults = Self::default();

        Self {
            request_timeout: file
                .request_timeout_secs
                .filter(|s| *s > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            connect_timeout: file
                .connect_timeout_secs
                .filter(|s| *s > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.connect_timeout),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Notifications
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationsConfig {
    /// How long a toast stays up unless dismissed
    pub duration: Duration,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            duration: crate::toast::DEFAULT_TOAST_DURATION,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileNotifications {
    pub duration_ms: Option<u64>,
}

impl NotificationsConfig {
    pub fn from_file(file: Option<FileNotifications>) -> Self {
        let file = file.unwrap_or_default();
        Self {
            duration: file
                .duration_ms
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(crate::toast::DEFAULT_TOAST_DURATION),
        }
    }
}
