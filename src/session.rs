//! Session coordinator
//!
//! Tracks which project (if any) is selected and therefore which scope's
//! console, operation, report list and chat transcript are the visible ones.
//! Selection only swaps the pointer: consoles and operations belong to their
//! scope key and are never touched by a selection change.
//!
//! The project list is a read-through cache of the backend's list, written
//! only after the backend confirms a create or delete.

use crate::api::{ApiError, Backend, GuidanceKind};
use crate::chat::{export_file_name, ChatRole, ChatTranscript, NETWORK_ERROR_REPLY};
use crate::console::Consoles;
use crate::events::{DashboardEvent, EventBus};
use crate::model::{OperationState, Project, ProjectId, Report, ScopeKey};
use crate::operation::OperationController;
use crate::refresh::{DerivedViews, RefreshHandle};
use crate::toast::NotificationQueue;
use chrono::Utc;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Missing or empty input; nothing was sent
    Validation(String),
    /// The action needs a selected project
    NoSelection,
    UnknownProject(ProjectId),
    Api(ApiError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(msg) => write!(f, "Invalid input: {}", msg),
            Self::NoSelection => write!(f, "No project selected"),
            Self::UnknownProject(id) => write!(f, "Unknown project: {}", id),
            Self::Api(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<ApiError> for SessionError {
    fn from(err: ApiError) -> Self {
        Self::Api(err)
    }
}

/// Tab shown for the active scope
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Tab {
    #[default]
    Scanner,
    Reports,
    Chat,
}

impl Tab {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scanner => "scanner",
            Self::Reports => "reports",
            Self::Chat => "chat",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "scanner" | "scan" => Some(Self::Scanner),
            "reports" => Some(Self::Reports),
            "chat" => Some(Self::Chat),
            _ => None,
        }
    }
}

/// Transcript plus a reset counter, so a late reply never lands in a
/// transcript that was reset while the request was in flight
#[derive(Debug, Clone, Default)]
struct ChatSlot {
    transcript: ChatTranscript,
    resets: u64,
}

impl ChatSlot {
    fn reset(&mut self) {
        self.transcript = ChatTranscript::welcome();
        self.resets += 1;
    }

    fn clear(&mut self) {
        self.transcript.clear();
        self.resets += 1;
    }
}

#[derive(Debug, Default)]
struct SessionState {
    /// `None` until the first successful load
    projects: Option<Vec<Project>>,
    selection: Option<ProjectId>,
    tab: Tab,
    chats: HashMap<ProjectId, ChatSlot>,
}

impl SessionState {
    fn find(&self, id: &ProjectId) -> Option<&Project> {
        self.projects.as_ref()?.iter().find(|p| &p.id == id)
    }
}

/// Snapshot of everything the user currently sees
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveView {
    pub scope: ScopeKey,
    pub project: Option<Project>,
    pub tab: Tab,
    pub operation: OperationState,
    pub console: Vec<String>,
    pub reports: Vec<Report>,
}

#[derive(Clone)]
pub struct SessionCoordinator {
    backend: Arc<dyn Backend>,
    state: Arc<Mutex<SessionState>>,
    consoles: Consoles,
    operations: OperationController,
    views: DerivedViews,
    refresh: RefreshHandle,
    toasts: NotificationQueue,
    bus: EventBus,
}

impl SessionCoordinator {
    pub fn new(
        backend: Arc<dyn Backend>,
        consoles: Consoles,
        operations: OperationController,
        views: DerivedViews,
        refresh: RefreshHandle,
        toasts: NotificationQueue,
        bus: EventBus,
    ) -> Self {
        Self {
            backend,
            state: Arc::new(Mutex::new(SessionState::default())),
            consoles,
            operations,
            views,
            refresh,
            toasts,
            bus,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Selection
    // ─────────────────────────────────────────────────────────────────────────

    /// Make `selection` the active scope (`None` for the global view)
    ///
    /// Resets the tab to Scanner and the project's chat to the welcome
    /// message, then schedules a refresh of the scope's derived views. Must
    /// be called from within a tokio runtime.
    pub fn select(&self, selection: Option<ProjectId>) -> Result<ScopeKey, SessionError> {
        let previous = {
            let mut state = self.lock();
            if let Some(id) = &selection {
                if state.find(id).is_none() {
                    return Err(SessionError::UnknownProject(id.clone()));
                }
                state.chats.entry(id.clone()).or_default().reset();
            }
            state.tab = Tab::Scanner;
            std::mem::replace(&mut state.selection, selection.clone())
        };

        let scope = ScopeKey::from(selection.clone());
        tracing::info!("Selected {}", scope);
        self.bus.publish(DashboardEvent::SelectionChanged {
            previous,
            current: selection,
        });
        self.refresh.schedule(scope.clone());
        Ok(scope)
    }

    pub fn selection(&self) -> Option<ProjectId> {
        self.lock().selection.clone()
    }

    /// The selected project, if any
    pub fn current(&self) -> Option<Project> {
        let state = self.lock();
        let id = state.selection.as_ref()?;
        state.find(id).cloned()
    }

    pub fn active_scope(&self) -> ScopeKey {
        ScopeKey::from(self.selection())
    }

    pub fn tab(&self) -> Tab {
        self.lock().tab
    }

    /// Switch tabs; the Reports tab reloads the scope's report list
    pub fn set_tab(&self, tab: Tab) -> Result<(), SessionError> {
        {
            let mut state = self.lock();
            if tab == Tab::Chat && state.selection.is_none() {
                return Err(SessionError::NoSelection);
            }
            state.tab = tab;
        }
        if tab == Tab::Reports {
            self.refresh.schedule(self.active_scope());
        }
        Ok(())
    }

    /// Snapshot of the active scope as rendered
    pub fn view(&self) -> ActiveView {
        let (scope, project, tab) = {
            let state = self.lock();
            let project = state
                .selection
                .as_ref()
                .and_then(|id| state.find(id).cloned());
            (ScopeKey::from(state.selection.clone()), project, state.tab)
        };
        ActiveView {
            operation: self.operations.state(&scope),
            console: self.consoles.lines(&scope),
            reports: self.views.reports(&scope),
            scope,
            project,
            tab,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Projects
    // ─────────────────────────────────────────────────────────────────────────

    /// Cached project list, loading it on first use
    pub async fn list(&self) -> Result<Vec<Project>, SessionError> {
        if let Some(projects) = self.lock().projects.clone() {
            return Ok(projects);
        }
        self.reload().await
    }

    /// Cached project list without touching the backend
    pub fn projects(&self) -> Vec<Project> {
        self.lock().projects.clone().unwrap_or_default()
    }

    /// Reload the project list from the backend
    ///
    /// On failure the cache is left empty rather than filled with stale or
    /// placeholder entries.
    pub async fn reload(&self) -> Result<Vec<Project>, SessionError> {
        match self.backend.list_projects().await {
            Ok(projects) => {
                tracing::debug!("Loaded {} projects", projects.len());
                self.lock().projects = Some(projects.clone());
                Ok(projects)
            }
            Err(e) => {
                tracing::warn!("Project list failed: {}", e);
                self.lock().projects = None;
                self.toasts
                    .error("Error", e.user_message("Failed to load projects"));
                Err(e.into())
            }
        }
    }

    /// Create a project; the cache only changes after the backend confirms
    pub async fn create(&self, name: &str, target: &str) -> Result<Project, SessionError> {
        let (name, target) = (name.trim(), target.trim());
        if name.is_empty() || target.is_empty() {
            self.toasts
                .error("Missing Fields", "Project name and target are required");
            return Err(SessionError::Validation(
                "name and target are required".into(),
            ));
        }

        match self.backend.create_project(name, target).await {
            Ok(project) => {
                {
                    let mut state = self.lock();
                    if let Some(projects) = state.projects.as_mut() {
                        if !projects.iter().any(|p| p.id == project.id) {
                            projects.push(project.clone());
                        }
                    }
                }
                tracing::info!("Project {} created ({})", project.id, project.name);
                self.toasts.success(
                    "Project Created",
                    format!("Project {} has been created", project.name),
                );
                Ok(project)
            }
            Err(e) => {
                tracing::warn!("Project create failed: {}", e);
                self.toasts
                    .error("Error", e.user_message("Failed to create the project"));
                Err(e.into())
            }
        }
    }

    /// Delete a project
    ///
    /// Clears the selection when it pointed at the deleted project. Any scan
    /// still running under that scope keeps draining into its console.
    pub async fn delete(&self, id: &ProjectId) -> Result<(), SessionError> {
        if let Err(e) = self.backend.delete_project(id).await {
            tracing::warn!("Project delete failed for {}: {}", id, e);
            self.toasts
                .error("Error", e.user_message("Failed to delete the project"));
            return Err(e.into());
        }

        let deselected = {
            let mut state = self.lock();
            if let Some(projects) = state.projects.as_mut() {
                projects.retain(|p| &p.id != id);
            }
            state.chats.remove(id);
            if state.selection.as_ref() == Some(id) {
                state.selection = None;
                state.tab = Tab::Scanner;
                true
            } else {
                false
            }
        };

        if deselected {
            self.bus.publish(DashboardEvent::SelectionChanged {
                previous: Some(id.clone()),
                current: None,
            });
        }
        tracing::info!("Project {} deleted", id);
        self.toasts
            .success("Project Deleted", "The project has been deleted");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reports
    // ─────────────────────────────────────────────────────────────────────────

    /// Report list of the active scope, as last refreshed
    pub fn reports(&self) -> Vec<Report> {
        self.views.reports(&self.active_scope())
    }

    /// Delete a report of the active scope, then reload the list
    pub async fn delete_report(&self, filename: &str) -> Result<String, SessionError> {
        let scope = self.active_scope();
        match self.backend.delete_report(&scope, filename).await {
            Ok(message) => {
                let message = if message.is_empty() {
                    format!("Report {} deleted successfully", filename)
                } else {
                    message
                };
                self.toasts.success("Report Deleted", message.clone());
                self.refresh.refresh(scope).await;
                Ok(message)
            }
            Err(e) => {
                tracing::warn!("Report delete failed for {}: {}", filename, e);
                self.toasts
                    .error("Error", e.user_message("Failed to delete the report"));
                Err(e.into())
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Chat
    // ─────────────────────────────────────────────────────────────────────────

    fn selected_id(&self) -> Result<ProjectId, SessionError> {
        self.selection().ok_or(SessionError::NoSelection)
    }

    /// Transcript of the selected project
    pub fn chat(&self) -> Option<ChatTranscript> {
        let state = self.lock();
        let id = state.selection.as_ref()?;
        Some(
            state
                .chats
                .get(id)
                .map(|slot| slot.transcript.clone())
                .unwrap_or_default(),
        )
    }

    /// Ask the selected project's assistant
    ///
    /// The reply (or the server's error text) is appended to the transcript
    /// either way; errors are also returned.
    pub async fn send_chat(&self, message: &str) -> Result<String, SessionError> {
        let id = self.selected_id()?;
        let message = message.trim();
        if message.is_empty() {
            return Err(SessionError::Validation("message is empty".into()));
        }

        let resets = {
            let mut state = self.lock();
            let slot = state.chats.entry(id.clone()).or_default();
            slot.transcript.push(ChatRole::User, message);
            slot.resets
        };

        let result = self.backend.project_chat(&id, message).await;
        let reply = match &result {
            Ok(reply) => reply.clone(),
            Err(e) => {
                tracing::warn!("Chat request for {} failed: {}", id, e);
                e.user_message(NETWORK_ERROR_REPLY)
            }
        };

        {
            let mut state = self.lock();
            match state.chats.get_mut(&id) {
                Some(slot) if slot.resets == resets => {
                    slot.transcript.push(ChatRole::Assistant, reply.clone());
                }
                _ => tracing::debug!("Chat for {} was reset; dropping late reply", id),
            }
        }

        result.map_err(SessionError::from)
    }

    pub fn clear_chat(&self) -> Result<(), SessionError> {
        let id = self.selected_id()?;
        self.lock()
            .chats
            .entry(id)
            .or_default()
            .clear();
        Ok(())
    }

    /// Export the selected project's transcript as `(file name, contents)`
    pub fn export_chat(&self) -> Result<(String, String), SessionError> {
        let id = self.selected_id()?;
        let name = self
            .current()
            .map(|p| p.name)
            .unwrap_or_else(|| id.to_string());
        let transcript = self.chat().unwrap_or_default();
        Ok((export_file_name(&name, Utc::now()), transcript.export()))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Guidance
    // ─────────────────────────────────────────────────────────────────────────

    /// Generate next-step guidance for the selected project
    pub async fn generate_guidance(&self, kind: GuidanceKind) -> Result<String, SessionError> {
        let id = self.selected_id()?;
        self.toasts.info(
            "Generating",
            format!("Generating {} guidance", kind.as_str()),
        );
        match self.backend.generate_guidance(&id, kind).await {
            Ok(message) => {
                self.toasts.success(
                    "Guidance Ready",
                    format!("Next {} steps are ready", kind.as_str()),
                );
                Ok(message)
            }
            Err(e) => {
                self.toasts
                    .error("Error", e.user_message("Failed to generate guidance"));
                Err(e.into())
            }
        }
    }

    /// Generated guidance markdown, `None` if it was never generated
    pub async fn guidance(&self, kind: GuidanceKind) -> Result<Option<String>, SessionError> {
        let id = self.selected_id()?;
        Ok(self.backend.guidance(&id, kind).await?)
    }
}
