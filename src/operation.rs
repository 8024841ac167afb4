//! Operation controller
//!
//! Owns the lifecycle of scan operations, one independent state machine per
//! scope key:
//!
//! ```text
//! Idle ──start──▶ Running ──stream ends──▶ Completed
//!                   │  ▲  └──error───────▶ Failed
//!              stop │  │ stop request failed
//!                   ▼  │
//!                Cancelling ──stream ends──▶ Completed
//!                           └──error───────▶ Failed
//! ```
//!
//! `start()` records the new session synchronously, then a detached task
//! drives the request and drains the response through the line framer into
//! the scope's console. `stop()` is advisory: it asks the backend to stop and
//! never closes the local read. Only the drain decides the terminal state.

use crate::api::{ApiError, Backend, StopReply};
use crate::console::Consoles;
use crate::events::{DashboardEvent, EventBus};
use crate::framer::frame_stream;
use crate::model::{OperationSession, OperationState, ScanOptions, ScanRequest, ScanType, ScopeKey};
use crate::refresh::RefreshHandle;
use crate::toast::NotificationQueue;
use chrono::Utc;
use futures::StreamExt;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;

// ─────────────────────────────────────────────────────────────────────────────
// Errors and Outcomes
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationError {
    /// Required input missing; nothing was sent
    Validation(String),
    /// An operation is already active for the scope (locally or per the backend)
    AlreadyRunning(ScopeKey),
    /// The backend call failed
    Api(ApiError),
    /// The drive task ended without reporting a state
    Interrupted(String),
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(msg) => write!(f, "Invalid input: {}", msg),
            Self::AlreadyRunning(scope) => write!(f, "A scan is already running for {}", scope),
            Self::Api(e) => write!(f, "{}", e),
            Self::Interrupted(msg) => write!(f, "Scan task interrupted: {}", msg),
        }
    }
}

impl std::error::Error for OperationError {}

impl From<ApiError> for OperationError {
    fn from(err: ApiError) -> Self {
        Self::Api(err)
    }
}

/// Result of a `stop()` call that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The backend accepted the stop; the drain continues until it closes
    Requested,
    /// The backend reported nothing running for the scope
    BackendIdle,
    /// Nothing active locally; no request was sent
    NothingRunning,
    /// A stop was already requested; no second request was sent
    StopPending,
}

/// Handle to the task draining one operation
///
/// Dropping it detaches the task; the drain keeps running.
pub struct OperationHandle {
    scope: ScopeKey,
    join: JoinHandle<Result<OperationState, OperationError>>,
}

impl OperationHandle {
    pub fn scope(&self) -> &ScopeKey {
        &self.scope
    }

    /// Wait for the terminal state
    ///
    /// A backend refusal on start (409) resolves to `AlreadyRunning`.
    pub async fn wait(self) -> Result<OperationState, OperationError> {
        match self.join.await {
            Ok(result) => result,
            Err(e) => Err(OperationError::Interrupted(e.to_string())),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Controller
// ─────────────────────────────────────────────────────────────────────────────

/// Session slot for one scope key
///
/// The generation counter tells a late stop reply or drain apart from the
/// operation that currently owns the slot.
#[derive(Debug, Clone)]
struct Slot {
    session: OperationSession,
    generation: u64,
}

#[derive(Default)]
struct Registry {
    slots: HashMap<ScopeKey, Slot>,
    next_generation: u64,
}

enum StopGate {
    Send(u64),
    Pending,
    Idle,
}

/// Starts, drains and stops scan operations, keyed by scope
#[derive(Clone)]
pub struct OperationController {
    backend: Arc<dyn Backend>,
    registry: Arc<Mutex<Registry>>,
    consoles: Consoles,
    toasts: NotificationQueue,
    refresh: RefreshHandle,
    bus: EventBus,
    refresh_on_complete: bool,
}

impl OperationController {
    pub fn new(
        backend: Arc<dyn Backend>,
        consoles: Consoles,
        toasts: NotificationQueue,
        refresh: RefreshHandle,
        bus: EventBus,
    ) -> Self {
        Self {
            backend,
            registry: Arc::new(Mutex::new(Registry::default())),
            consoles,
            toasts,
            refresh,
            bus,
            refresh_on_complete: true,
        }
    }

    /// Whether a completed operation schedules a derived-view refresh
    pub fn with_refresh_on_complete(mut self, enabled: bool) -> Self {
        self.refresh_on_complete = enabled;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    /// Current state for a scope (Idle if it never ran)
    pub fn state(&self, scope: &ScopeKey) -> OperationState {
        self.lock()
            .slots
            .get(scope)
            .map(|slot| slot.session.state)
            .unwrap_or_default()
    }

    fn session_slot(&self, scope: &ScopeKey) -> Option<Slot> {
        self.lock().slots.get(scope).cloned()
    }

    /// Most recent session for a scope
    pub fn session(&self, scope: &ScopeKey) -> Option<OperationSession> {
        self.lock().slots.get(scope).map(|slot| slot.session.clone())
    }

    /// Scopes with an active (Running or Cancelling) operation
    pub fn active_scopes(&self) -> Vec<ScopeKey> {
        let mut scopes: Vec<_> = self
            .lock()
            .slots
            .values()
            .filter(|slot| slot.session.state.is_active())
            .map(|slot| slot.session.scope.clone())
            .collect();
        scopes.sort();
        scopes
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Start
    // ─────────────────────────────────────────────────────────────────────────

    /// Start a scan for `target` on `scope`
    ///
    /// Rejected without touching the console when the target is empty or an
    /// operation is already active for the scope. Otherwise the scope moves to
    /// Running immediately and the request is driven by a background task.
    /// Must be called from within a tokio runtime.
    pub fn start(
        &self,
        scope: ScopeKey,
        target: &str,
        options: ScanOptions,
    ) -> Result<OperationHandle, OperationError> {
        let target = target.trim();
        if target.is_empty() {
            self.toasts
                .error("Invalid Target", "Please enter a target to scan");
            return Err(OperationError::Validation("target is required".into()));
        }

        let options = match scope {
            ScopeKey::Project(_) => options.scan_type(ScanType::Project),
            ScopeKey::Global => options,
        };

        let (generation, previous) = {
            let mut registry = self.lock();
            if let Some(slot) = registry.slots.get(&scope) {
                if slot.session.state.is_active() {
                    drop(registry);
                    tracing::info!("Start rejected: {} already has an active scan", scope);
                    self.toasts.warning(
                        "Scan Already Running",
                        format!("A scan is already running for {}", scope),
                    );
                    return Err(OperationError::AlreadyRunning(scope));
                }
            }

            registry.next_generation += 1;
            let generation = registry.next_generation;
            let session = OperationSession {
                target: target.to_string(),
                scope: scope.clone(),
                state: OperationState::Running,
                started_at: Utc::now(),
            };
            let previous = registry
                .slots
                .insert(scope.clone(), Slot { session, generation })
                .map(|slot| slot.session);

            self.bus.publish(DashboardEvent::OperationChanged {
                scope: scope.clone(),
                target: target.to_string(),
                from: previous.as_ref().map(|s| s.state).unwrap_or_default(),
                to: OperationState::Running,
                timestamp: Utc::now(),
            });
            (generation, previous)
        };

        tracing::info!(
            "Scan started for {} on {} (comprehensive: {}, type: {})",
            target,
            scope,
            options.comprehensive,
            options.scan_type.as_str()
        );
        self.toasts
            .info("Scan Started", format!("Starting scan for {}", target));

        let request = ScanRequest {
            scope: scope.clone(),
            target: target.to_string(),
            options,
        };
        let controller = self.clone();
        let join = tokio::spawn(async move { controller.drive(request, generation, previous).await });

        Ok(OperationHandle { scope, join })
    }

    async fn drive(
        self,
        request: ScanRequest,
        generation: u64,
        previous: Option<OperationSession>,
    ) -> Result<OperationState, OperationError> {
        let scope = request.scope.clone();

        let stream = match self.backend.start_scan(&request).await {
            Ok(stream) => stream,
            Err(ApiError::Conflict { message }) => {
                self.restore(&scope, generation, previous);
                tracing::info!("Backend refused start for {}: already running", scope);
                self.toasts.warning(
                    "Scan Already Running",
                    message.unwrap_or_else(|| "A scan is already running".to_string()),
                );
                return Err(OperationError::AlreadyRunning(scope));
            }
            Err(err) => return Ok(self.fail(&scope, generation, &err)),
        };

        // Accepted: the console now belongs to this run
        self.consoles.clear(&scope);

        let lines = frame_stream(stream);
        tokio::pin!(lines);
        while let Some(item) = lines.next().await {
            match item {
                Ok(line) => {
                    self.consoles.append(&scope, line);
                }
                Err(err) => return Ok(self.fail(&scope, generation, &err)),
            }
        }

        Ok(self.complete(&scope, generation))
    }

    /// Undo a start the backend refused
    fn restore(&self, scope: &ScopeKey, generation: u64, previous: Option<OperationSession>) {
        let mut registry = self.lock();
        let Some(slot) = registry.slots.get(scope) else {
            return;
        };
        if slot.generation != generation {
            return;
        }
        let target = slot.session.target.clone();
        let from = slot.session.state;
        let to = previous.as_ref().map(|s| s.state).unwrap_or_default();

        match previous {
            Some(session) => {
                registry.slots.insert(
                    scope.clone(),
                    Slot {
                        session,
                        generation,
                    },
                );
            }
            None => {
                registry.slots.remove(scope);
            }
        }

        self.bus.publish(DashboardEvent::OperationChanged {
            scope: scope.clone(),
            target,
            from,
            to,
            timestamp: Utc::now(),
        });
    }

    /// Move the slot to `to` if it still belongs to `generation`
    ///
    /// Returns the previous state and the target on success.
    fn transition(
        &self,
        scope: &ScopeKey,
        generation: u64,
        to: OperationState,
        allowed_from: &[OperationState],
    ) -> Option<(OperationState, String)> {
        let mut registry = self.lock();
        let slot = registry.slots.get_mut(scope)?;
        if slot.generation != generation || !allowed_from.contains(&slot.session.state) {
            return None;
        }

        let from = slot.session.state;
        slot.session.state = to;
        let target = slot.session.target.clone();

        self.bus.publish(DashboardEvent::OperationChanged {
            scope: scope.clone(),
            target: target.clone(),
            from,
            to,
            timestamp: Utc::now(),
        });
        tracing::info!("Operation {} on {}: {} -> {}", target, scope, from, to);
        Some((from, target))
    }

    fn fail(&self, scope: &ScopeKey, generation: u64, err: &ApiError) -> OperationState {
        tracing::warn!("Scan on {} failed: {}", scope, err);
        self.consoles.append(scope, format!("[!] Error: {}", err));

        let active = [OperationState::Running, OperationState::Cancelling];
        if self
            .transition(scope, generation, OperationState::Failed, &active)
            .is_some()
        {
            self.toasts.error(
                "Scan Error",
                err.user_message("An error occurred during the scan"),
            );
        }
        OperationState::Failed
    }

    fn complete(&self, scope: &ScopeKey, generation: u64) -> OperationState {
        let active = [OperationState::Running, OperationState::Cancelling];
        match self.transition(scope, generation, OperationState::Completed, &active) {
            Some((OperationState::Cancelling, target)) => {
                self.toasts
                    .info("Scan Stopped", format!("Scan for {} was stopped", target));
            }
            Some((_, target)) => {
                self.toasts
                    .success("Scan Completed", format!("Scan for {} has finished", target));
            }
            None => return self.state(scope),
        }

        if self.refresh_on_complete {
            self.refresh.schedule(scope.clone());
        }
        OperationState::Completed
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Stop
    // ─────────────────────────────────────────────────────────────────────────

    /// Ask the backend to stop the scope's scan
    ///
    /// Does nothing but notify when no scan is active. The local drain is
    /// never interrupted; the stream's own end decides the terminal state.
    pub async fn stop(&self, scope: &ScopeKey) -> Result<StopOutcome, OperationError> {
        let gate = match self.session_slot(scope) {
            Some(slot) if slot.session.state == OperationState::Running => {
                StopGate::Send(slot.generation)
            }
            Some(slot) if slot.session.state == OperationState::Cancelling => StopGate::Pending,
            _ => StopGate::Idle,
        };

        let generation = match gate {
            StopGate::Send(generation) => generation,
            StopGate::Pending => {
                self.toasts
                    .info("Stop Pending", "A stop request is already in progress");
                return Ok(StopOutcome::StopPending);
            }
            StopGate::Idle => {
                tracing::debug!("Stop on {} ignored: nothing running", scope);
                self.toasts.warning("No Scan Running", "No scan is running");
                return Ok(StopOutcome::NothingRunning);
            }
        };

        // Another stop may have won the race since the check above
        if self
            .transition(
                scope,
                generation,
                OperationState::Cancelling,
                &[OperationState::Running],
            )
            .is_none()
        {
            self.toasts
                .info("Stop Pending", "A stop request is already in progress");
            return Ok(StopOutcome::StopPending);
        }

        match self.backend.stop_scan(scope).await {
            Ok(StopReply::Stopped { message }) => {
                self.consoles.append(
                    scope,
                    message.unwrap_or_else(|| "[*] Scan stopped successfully".to_string()),
                );
                self.toasts
                    .warning("Scan Aborted", "The scan has been stopped");
                Ok(StopOutcome::Requested)
            }
            Ok(StopReply::NothingRunning { message }) => {
                // The backend has not registered the scan yet; keep it stoppable
                self.transition(
                    scope,
                    generation,
                    OperationState::Running,
                    &[OperationState::Cancelling],
                );
                self.consoles.append(
                    scope,
                    message.unwrap_or_else(|| "[*] No scan is running".to_string()),
                );
                self.toasts.warning("No Scan Running", "No scan is running");
                Ok(StopOutcome::BackendIdle)
            }
            Err(err) => {
                tracing::warn!("Stop request for {} failed: {}", scope, err);
                self.transition(
                    scope,
                    generation,
                    OperationState::Running,
                    &[OperationState::Cancelling],
                );
                self.consoles
                    .append(scope, err.user_message("[!] Error: Failed to stop the scan"));
                self.toasts
                    .error("Error", err.user_message("Failed to stop the scan"));
                Err(OperationError::Api(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::{settle, ScriptedBackend};
    use crate::refresh::{DerivedViews, Refresher};
    use crate::toast::{Toast, ToastKind, DEFAULT_TOAST_DURATION};

    struct Harness {
        backend: Arc<ScriptedBackend>,
        controller: OperationController,
        consoles: Consoles,
        toasts: NotificationQueue,
        views: DerivedViews,
    }

    fn harness() -> Harness {
        let bus = EventBus::default();
        let backend = ScriptedBackend::new();
        let consoles = Consoles::new(bus.clone());
        let toasts = NotificationQueue::new(bus.clone(), DEFAULT_TOAST_DURATION);
        let views = DerivedViews::new();
        let refresh = Refresher::spawn(backend.clone(), views.clone(), toasts.clone(), bus.clone());
        let controller = OperationController::new(
            backend.clone(),
            consoles.clone(),
            toasts.clone(),
            refresh,
            bus,
        );
        Harness {
            backend,
            controller,
            consoles,
            toasts,
            views,
        }
    }

    fn titles(toasts: &NotificationQueue) -> Vec<(ToastKind, String)> {
        toasts
            .active()
            .into_iter()
            .map(|Toast { kind, title, .. }| (kind, title))
            .collect()
    }

    #[tokio::test]
    async fn test_streamed_fragments_become_three_lines() {
        let h = harness();
        let scope = ScopeKey::Global;

        let handle = h
            .controller
            .start(scope.clone(), "example.com", ScanOptions::default())
            .unwrap();
        assert_eq!(h.controller.state(&scope), OperationState::Running);

        h.backend.send(&scope, "[*] Starting\n[*] Po");
        h.backend.send(&scope, "rt scan\n[OK] Done\n");
        h.backend.finish(&scope);

        assert_eq!(handle.wait().await, Ok(OperationState::Completed));
        assert_eq!(
            h.consoles.lines(&scope),
            vec!["[*] Starting", "[*] Port scan", "[OK] Done"]
        );
        assert_eq!(
            titles(&h.toasts),
            vec![
                (ToastKind::Info, "Scan Started".to_string()),
                (ToastKind::Success, "Scan Completed".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_stop_with_nothing_running() {
        let h = harness();
        let scope = ScopeKey::Global;

        assert_eq!(
            h.controller.stop(&scope).await,
            Ok(StopOutcome::NothingRunning)
        );
        assert_eq!(h.controller.state(&scope), OperationState::Idle);
        assert!(h.consoles.lines(&scope).is_empty());
        assert_eq!(
            titles(&h.toasts),
            vec![(ToastKind::Warning, "No Scan Running".to_string())]
        );
        assert_eq!(h.backend.count("stop"), 0);
    }

    #[tokio::test]
    async fn test_second_stop_after_completion_is_single_noop() {
        let h = harness();
        let scope = ScopeKey::Global;
        let handle = h
            .controller
            .start(scope.clone(), "example.com", ScanOptions::default())
            .unwrap();
        h.backend.send(&scope, "[*] Working\n");
        settle(|| h.consoles.len(&scope) == 1).await;

        assert_eq!(h.controller.stop(&scope).await, Ok(StopOutcome::Requested));
        h.backend.send(&scope, "[*] Flushed after stop\n");
        h.backend.finish(&scope);
        assert_eq!(handle.wait().await, Ok(OperationState::Completed));

        let before = h.toasts.len();
        assert_eq!(
            h.controller.stop(&scope).await,
            Ok(StopOutcome::NothingRunning)
        );
        let after = h.toasts.active();
        assert_eq!(after.len(), before + 1);
        assert_eq!(after.last().map(|t| t.title.as_str()), Some("No Scan Running"));
        assert_eq!(h.backend.count("stop"), 1);

        // The drain kept reading after the stop was accepted
        assert_eq!(
            h.consoles.lines(&scope),
            vec!["[*] Working", "Scan aborted.", "[*] Flushed after stop"]
        );
    }

    #[tokio::test]
    async fn test_stop_then_stream_end_reports_stopped() {
        let h = harness();
        let scope = ScopeKey::project("p1");
        let handle = h
            .controller
            .start(scope.clone(), "10.0.0.5", ScanOptions::default())
            .unwrap();
        settle(|| h.backend.count("start") == 1).await;

        assert_eq!(h.controller.stop(&scope).await, Ok(StopOutcome::Requested));
        assert_eq!(h.controller.state(&scope), OperationState::Cancelling);
        assert_eq!(
            h.controller.stop(&scope).await,
            Ok(StopOutcome::StopPending)
        );

        h.backend.finish(&scope);
        assert_eq!(handle.wait().await, Ok(OperationState::Completed));

        let kinds = titles(&h.toasts);
        assert_eq!(
            kinds.last(),
            Some(&(ToastKind::Info, "Scan Stopped".to_string()))
        );
        assert_eq!(h.backend.count("stop"), 1);
    }

    #[tokio::test]
    async fn test_backend_idle_stop_keeps_scan_stoppable() {
        let h = harness();
        let scope = ScopeKey::Global;
        let handle = h
            .controller
            .start(scope.clone(), "example.com", ScanOptions::default())
            .unwrap();
        settle(|| h.backend.count("start") == 1).await;
        h.backend
            .push_stop_reply(Ok(StopReply::NothingRunning { message: None }));

        assert_eq!(h.controller.stop(&scope).await, Ok(StopOutcome::BackendIdle));
        assert_eq!(h.controller.state(&scope), OperationState::Running);

        h.backend.send(&scope, "[*] Still scanning\n");
        assert_eq!(h.controller.stop(&scope).await, Ok(StopOutcome::Requested));
        assert_eq!(h.controller.state(&scope), OperationState::Cancelling);
        assert_eq!(h.backend.count("stop"), 2);

        h.backend.finish(&scope);
        assert_eq!(handle.wait().await, Ok(OperationState::Completed));
    }

    #[tokio::test]
    async fn test_failed_stop_reverts_to_running() {
        let h = harness();
        let scope = ScopeKey::Global;
        let handle = h
            .controller
            .start(scope.clone(), "example.com", ScanOptions::default())
            .unwrap();
        settle(|| h.backend.count("start") == 1).await;
        h.backend.push_stop_reply(Err(ApiError::Status {
            status: 500,
            message: Some("scanner unreachable".into()),
        }));

        let result = h.controller.stop(&scope).await;
        assert!(matches!(result, Err(OperationError::Api(_))));
        assert_eq!(h.controller.state(&scope), OperationState::Running);

        h.backend.finish(&scope);
        assert_eq!(handle.wait().await, Ok(OperationState::Completed));
        assert!(h
            .consoles
            .lines(&scope)
            .contains(&"scanner unreachable".to_string()));
    }

    #[tokio::test]
    async fn test_rejected_start_leaves_console_untouched() {
        let h = harness();
        let scope = ScopeKey::Global;
        let handle = h
            .controller
            .start(scope.clone(), "example.com", ScanOptions::default())
            .unwrap();
        h.backend.send(&scope, "[*] First run\n");
        settle(|| h.consoles.len(&scope) == 1).await;

        let second = h
            .controller
            .start(scope.clone(), "other.com", ScanOptions::default());
        assert!(matches!(second, Err(OperationError::AlreadyRunning(_))));
        assert_eq!(h.consoles.lines(&scope), vec!["[*] First run"]);
        assert_eq!(
            h.controller.session(&scope).map(|s| s.target),
            Some("example.com".to_string())
        );
        assert_eq!(h.backend.count("start"), 1);

        h.backend.finish(&scope);
        handle.wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_scopes_run_independently() {
        let h = harness();
        let global = ScopeKey::Global;
        let project = ScopeKey::project("p7");

        let a = h
            .controller
            .start(global.clone(), "example.com", ScanOptions::default())
            .unwrap();
        h.backend.send(&global, "[*] global\n");
        settle(|| h.consoles.len(&global) == 1).await;

        let b = h
            .controller
            .start(project.clone(), "corp.local", ScanOptions::default())
            .unwrap();
        h.backend.send(&project, "[*] project\n");
        h.backend.finish(&project);
        assert_eq!(b.wait().await, Ok(OperationState::Completed));

        assert_eq!(h.controller.state(&global), OperationState::Running);
        assert_eq!(h.consoles.lines(&global), vec!["[*] global"]);
        assert_eq!(h.controller.active_scopes(), vec![global.clone()]);

        h.backend.finish(&global);
        assert_eq!(a.wait().await, Ok(OperationState::Completed));
    }

    #[tokio::test]
    async fn test_transport_error_keeps_partial_output() {
        let h = harness();
        let scope = ScopeKey::Global;
        let handle = h
            .controller
            .start(scope.clone(), "example.com", ScanOptions::default())
            .unwrap();

        h.backend.send(&scope, "[*] Starting\n[*] Half a li");
        h.backend.fail_stream(&scope, "connection reset");

        assert_eq!(handle.wait().await, Ok(OperationState::Failed));
        assert_eq!(
            h.consoles.lines(&scope),
            vec![
                "[*] Starting",
                "[*] Half a li",
                "[!] Error: Network error: connection reset"
            ]
        );
        assert_eq!(
            titles(&h.toasts).last(),
            Some(&(ToastKind::Error, "Scan Error".to_string()))
        );
        assert!(!h.controller.state(&scope).is_active());
    }

    #[tokio::test]
    async fn test_non_success_status_fails_with_server_message() {
        let h = harness();
        let scope = ScopeKey::Global;
        h.backend.fail_next_start(ApiError::Status {
            status: 502,
            message: None,
        });

        let handle = h
            .controller
            .start(scope.clone(), "example.com", ScanOptions::default())
            .unwrap();
        assert_eq!(handle.wait().await, Ok(OperationState::Failed));
        assert_eq!(
            h.consoles.lines(&scope),
            vec!["[!] Error: HTTP error! status: 502"]
        );
        let last = h.toasts.active().pop().unwrap();
        assert_eq!(last.message, "An error occurred during the scan");
    }

    #[tokio::test]
    async fn test_backend_conflict_restores_previous_state() {
        let h = harness();
        let scope = ScopeKey::Global;
        h.consoles.append(&scope, "[OK] older output");
        h.backend.fail_next_start(ApiError::Conflict {
            message: Some("A scan is already running".into()),
        });

        let handle = h
            .controller
            .start(scope.clone(), "example.com", ScanOptions::default())
            .unwrap();
        assert_eq!(
            handle.wait().await,
            Err(OperationError::AlreadyRunning(scope.clone()))
        );
        assert_eq!(h.controller.state(&scope), OperationState::Idle);
        assert_eq!(h.controller.session(&scope), None);
        assert_eq!(h.consoles.lines(&scope), vec!["[OK] older output"]);
    }

    #[tokio::test]
    async fn test_empty_target_rejected_before_request() {
        let h = harness();
        let result = h
            .controller
            .start(ScopeKey::Global, "   ", ScanOptions::default());
        assert!(matches!(result, Err(OperationError::Validation(_))));
        assert_eq!(h.backend.count("start"), 0);
        assert_eq!(
            titles(&h.toasts),
            vec![(ToastKind::Error, "Invalid Target".to_string())]
        );
    }

    #[tokio::test]
    async fn test_project_scope_forces_project_scan_type() {
        let h = harness();
        let scope = ScopeKey::project("p3");
        let options = ScanOptions::default().comprehensive(true);
        let handle = h
            .controller
            .start(scope.clone(), "shop.example.com", options)
            .unwrap();
        h.backend.finish(&scope);
        handle.wait().await.unwrap();

        let request = h.backend.requests().pop().unwrap();
        assert_eq!(request.options.scan_type, ScanType::Project);
        assert!(request.options.comprehensive);
        assert_eq!(request.target, "shop.example.com");
    }

    #[tokio::test]
    async fn test_completion_schedules_refresh() {
        let h = harness();
        let scope = ScopeKey::project("p4");
        h.backend.set_reports(scope.clone(), &["corp_report.pdf"]);

        let handle = h
            .controller
            .start(scope.clone(), "corp.local", ScanOptions::default())
            .unwrap();
        h.backend.finish(&scope);
        handle.wait().await.unwrap();

        settle(|| !h.views.reports(&scope).is_empty()).await;
        assert_eq!(h.views.reports(&scope)[0].filename, "corp_report.pdf");
    }

    #[tokio::test]
    async fn test_restart_after_completion_clears_console() {
        let h = harness();
        let scope = ScopeKey::Global;

        let first = h
            .controller
            .start(scope.clone(), "a.com", ScanOptions::default())
            .unwrap();
        h.backend.send(&scope, "first run\n");
        h.backend.finish(&scope);
        first.wait().await.unwrap();

        let second = h
            .controller
            .start(scope.clone(), "b.com", ScanOptions::default())
            .unwrap();
        h.backend.send(&scope, "second run\n");
        h.backend.finish(&scope);
        second.wait().await.unwrap();

        assert_eq!(h.consoles.lines(&scope), vec!["second run"]);
    }
}
