//! External scan backend contract
//!
//! Everything the dashboard persists or executes lives behind this trait: the
//! scan engine, projects, reports, chat, and settings. The core only ever talks
//! to `dyn Backend`, so the reqwest client, the demo server, and test doubles
//! are interchangeable.
//!
//! # Status conventions
//!
//! - Start: 2xx streams text, 409 means already running for the scope, any
//!   other status fails the operation.
//! - Stop: 200 stopped, 404 nothing running, anything else is an error.
//! - JSON error bodies carry `{ "error": "..." }`; some endpoints use
//!   `{ "message": "..." }`. Both are surfaced through [`ApiError::user_message`].

mod http;

pub use http::HttpBackend;

use crate::model::{Project, ProjectId, Report, ScanRecord, ScanRequest, ScopeKey, Stats};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Incrementally delivered scan output
pub type ScanStream = BoxStream<'static, Result<Bytes, ApiError>>;

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Errors reported by a backend call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The resource is busy (a scan is already running for the scope)
    Conflict { message: Option<String> },
    /// The resource does not exist
    NotFound { message: Option<String> },
    /// Any other non-success status
    Status { status: u16, message: Option<String> },
    /// No response: connection refused, reset, timeout, or body read failure
    Network(String),
    /// A response arrived but could not be decoded
    Decode(String),
    /// The configured base URL cannot carry the request path
    InvalidUrl(String),
}

impl ApiError {
    /// Server-provided message if there is one, else the fallback
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            Self::Conflict { message }
            | Self::NotFound { message }
            | Self::Status { message, .. } => {
                message.clone().unwrap_or_else(|| fallback.to_string())
            }
            Self::Network(_) | Self::Decode(_) | Self::InvalidUrl(_) => fallback.to_string(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Conflict { .. } => Some(409),
            Self::NotFound { .. } => Some(404),
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Conflict { message } => match message {
                Some(msg) => write!(f, "Conflict: {}", msg),
                None => write!(f, "Conflict"),
            },
            Self::NotFound { message } => match message {
                Some(msg) => write!(f, "Not found: {}", msg),
                None => write!(f, "Not found"),
            },
            Self::Status { status, message } => match message {
                Some(msg) => write!(f, "HTTP error! status: {} ({})", status, msg),
                None => write!(f, "HTTP error! status: {}", status),
            },
            Self::Network(msg) => write!(f, "Network error: {}", msg),
            Self::Decode(msg) => write!(f, "Invalid response: {}", msg),
            Self::InvalidUrl(msg) => write!(f, "Invalid URL: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

// ─────────────────────────────────────────────────────────────────────────────
// Reply Types
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of a stop request the backend answered with 200 or 404
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReply {
    Stopped { message: Option<String> },
    NothingRunning { message: Option<String> },
}

/// API tokens the backend stores for its scan modules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenName {
    Wpscan,
    Dnsdumpster,
    Mxtoolbox,
    Apininja,
    Intelx,
    Gemini,
}

impl TokenName {
    pub const ALL: [TokenName; 6] = [
        Self::Wpscan,
        Self::Dnsdumpster,
        Self::Mxtoolbox,
        Self::Apininja,
        Self::Intelx,
        Self::Gemini,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wpscan => "wpscan",
            Self::Dnsdumpster => "dnsdumpster",
            Self::Mxtoolbox => "mxtoolbox",
            Self::Apininja => "apininja",
            Self::Intelx => "intelx",
            Self::Gemini => "gemini",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for TokenName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// AI-generated follow-up documents for a project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuidanceKind {
    Offensive,
    Defensive,
}

impl GuidanceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Offensive => "offensive",
            Self::Defensive => "defensive",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend Trait
// ─────────────────────────────────────────────────────────────────────────────

/// The external API consumed by the dashboard core
#[async_trait]
pub trait Backend: Send + Sync {
    /// Human-readable name for logging
    fn name(&self) -> &str;

    /// Start a scan; resolves once the backend has accepted (or refused) it
    async fn start_scan(&self, request: &ScanRequest) -> Result<ScanStream, ApiError>;

    /// Ask the backend to stop the scan for a scope (advisory)
    async fn stop_scan(&self, scope: &ScopeKey) -> Result<StopReply, ApiError>;

    async fn list_projects(&self) -> Result<Vec<Project>, ApiError>;

    async fn create_project(&self, name: &str, target: &str) -> Result<Project, ApiError>;

    async fn delete_project(&self, id: &ProjectId) -> Result<(), ApiError>;

    async fn list_reports(&self, scope: &ScopeKey) -> Result<Vec<Report>, ApiError>;

    /// Delete a report; returns the server confirmation message
    async fn delete_report(&self, scope: &ScopeKey, filename: &str) -> Result<String, ApiError>;

    /// Ask the project assistant; returns the reply text
    async fn project_chat(&self, id: &ProjectId, message: &str) -> Result<String, ApiError>;

    async fn stats(&self) -> Result<Stats, ApiError>;

    async fn recent_scans(&self) -> Result<Vec<ScanRecord>, ApiError>;

    /// Stored token value, `None` when unset
    async fn get_token(&self, name: TokenName) -> Result<Option<String>, ApiError>;

    async fn set_token(&self, name: TokenName, token: &str) -> Result<String, ApiError>;

    async fn get_proxy_config(&self) -> Result<serde_json::Value, ApiError>;

    async fn set_proxy_config(&self, config: &serde_json::Value) -> Result<String, ApiError>;

    /// Generate next-step guidance for a project
    async fn generate_guidance(&self, id: &ProjectId, kind: GuidanceKind)
        -> Result<String, ApiError>;

    /// Fetch generated guidance markdown, `None` if not generated yet
    async fn guidance(&self, id: &ProjectId, kind: GuidanceKind)
        -> Result<Option<String>, ApiError>;
}

#[cfg(test)]
pub(crate) mod testing;
