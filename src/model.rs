// Data model shared by the operation, session and refresh layers
//
// Projects, reports and scan records are owned by the external API; the
// types here mirror its JSON shapes. Scope keys and operation sessions are
// purely client-side.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ─────────────────────────────────────────────────────────────────────────────
// Scope Keys
// ─────────────────────────────────────────────────────────────────────────────

/// Project identifier as issued by the backend (opaque string)
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(pub String);

impl ProjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies an independent operation/console instance
///
/// Every piece of per-operation state (console lines, running flag, report
/// list) is keyed by this, never by a single global flag.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKey {
    /// The dashboard-wide scanner (no project selected)
    Global,
    /// A scanner bound to one project
    Project(ProjectId),
}

impl ScopeKey {
    pub fn project(id: impl Into<String>) -> Self {
        Self::Project(ProjectId::new(id))
    }

    pub fn project_id(&self) -> Option<&ProjectId> {
        match self {
            Self::Global => None,
            Self::Project(id) => Some(id),
        }
    }

    pub fn is_global(&self) -> bool {
        matches!(self, Self::Global)
    }

    /// Wire form used in request parameters: "global" or the project id
    pub fn as_param(&self) -> &str {
        match self {
            Self::Global => "global",
            Self::Project(id) => id.as_str(),
        }
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => write!(f, "global"),
            Self::Project(id) => write!(f, "project:{}", id),
        }
    }
}

impl From<Option<ProjectId>> for ScopeKey {
    fn from(selection: Option<ProjectId>) -> Self {
        selection.map(Self::Project).unwrap_or(Self::Global)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend Resources
// ─────────────────────────────────────────────────────────────────────────────

/// A project as stored by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub target: String,
    /// Creation date as reported by the backend (e.g. "2024-01-15")
    #[serde(default)]
    pub created_at: String,
}

/// A generated report file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub filename: String,
}

/// One finished scan from the backend's scan log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRecord {
    pub target: String,
    pub date: String,
    pub status: String,
}

/// Dashboard summary counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    #[serde(default)]
    pub reports_count: u64,
    #[serde(default)]
    pub modules_count: u64,
    #[serde(default)]
    pub clients_count: u64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Scan Options
// ─────────────────────────────────────────────────────────────────────────────

/// Scan flavour requested from the backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanType {
    #[default]
    Full,
    Project,
}

impl ScanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Project => "project",
        }
    }
}

/// Options accepted by `start()`; they only shape the outbound request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanOptions {
    pub comprehensive: bool,
    pub scan_type: ScanType,
}

impl ScanOptions {
    pub fn comprehensive(mut self, enabled: bool) -> Self {
        self.comprehensive = enabled;
        self
    }

    pub fn scan_type(mut self, scan_type: ScanType) -> Self {
        self.scan_type = scan_type;
        self
    }
}

/// Fully resolved start request handed to the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
    pub scope: ScopeKey,
    pub target: String,
    pub options: ScanOptions,
}

// ─────────────────────────────────────────────────────────────────────────────
// Operation Sessions
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle state of the operation for one scope key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    #[default]
    Idle,
    Running,
    Cancelling,
    Completed,
    Failed,
}

impl OperationState {
    /// Running or Cancelling: the backend may still be producing output
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Cancelling)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Cancelling => "cancelling",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{}", label)
    }
}

/// The most recent operation for a scope key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationSession {
    pub target: String,
    pub scope: ScopeKey,
    pub state: OperationState,
    pub started_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_from_selection() {
        assert_eq!(ScopeKey::from(None), ScopeKey::Global);
        assert_eq!(
            ScopeKey::from(Some(ProjectId::new("42"))),
            ScopeKey::project("42")
        );
    }

    #[test]
    fn test_scope_param_and_display() {
        assert_eq!(ScopeKey::Global.as_param(), "global");
        assert_eq!(ScopeKey::project("17").as_param(), "17");
        assert_eq!(ScopeKey::project("17").to_string(), "project:17");
    }

    #[test]
    fn test_project_deserializes_backend_shape() {
        let json = r#"{"id":"1705312","name":"Shop","target":"shop.example.com","created_at":"2024-01-15"}"#;
        let project: Project = serde_json::from_str(json).unwrap();
        assert_eq!(project.id, ProjectId::new("1705312"));
        assert_eq!(project.created_at, "2024-01-15");
    }

    #[test]
    fn test_active_states() {
        assert!(OperationState::Running.is_active());
        assert!(OperationState::Cancelling.is_active());
        assert!(!OperationState::Completed.is_active());
        assert!(OperationState::Failed.is_terminal());
        assert!(!OperationState::Idle.is_terminal());
    }
}
