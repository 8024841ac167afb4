//! Composition root: one handle owning every core component
//!
//! Front ends (the interactive shell, the one-shot `scan` command) talk to a
//! [`Dashboard`] and subscribe to its [`EventBus`]; they never reach into the
//! components' internals.

use crate::api::{Backend, HttpBackend};
use crate::config::Config;
use crate::console::Consoles;
use crate::events::{EventBus, DEFAULT_BUS_CAPACITY};
use crate::model::{ScanOptions, ScopeKey};
use crate::operation::{OperationController, OperationError, OperationHandle, StopOutcome};
use crate::refresh::{DerivedViews, RefreshHandle, Refresher};
use crate::session::SessionCoordinator;
use crate::settings::Settings;
use crate::toast::{NotificationQueue, DEFAULT_TOAST_DURATION};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

/// Tunables that shape how the components behave once wired
#[derive(Debug, Clone)]
pub struct DashboardOptions {
    pub toast_duration: Duration,
    pub refresh_on_complete: bool,
    pub bus_capacity: usize,
}

impl Default for DashboardOptions {
    fn default() -> Self {
        Self {
            toast_duration: DEFAULT_TOAST_DURATION,
            refresh_on_complete: true,
            bus_capacity: DEFAULT_BUS_CAPACITY,
        }
    }
}

impl From<&Config> for DashboardOptions {
    fn from(config: &Config) -> Self {
        Self {
            toast_duration: config.notifications.duration,
            refresh_on_complete: config.features.refresh_on_complete,
            bus_capacity: DEFAULT_BUS_CAPACITY,
        }
    }
}

#[derive(Clone)]
pub struct Dashboard {
    backend: Arc<dyn Backend>,
    bus: EventBus,
    consoles: Consoles,
    toasts: NotificationQueue,
    views: DerivedViews,
    refresh: RefreshHandle,
    operations: OperationController,
    session: SessionCoordinator,
    settings: Settings,
}

impl Dashboard {
    /// Wire every component around `backend`
    ///
    /// Spawns the refresh worker, so this must be called from within a tokio
    /// runtime.
    pub fn new(backend: Arc<dyn Backend>, options: DashboardOptions) -> Self {
        let bus = EventBus::new(options.bus_capacity);
        let consoles = Consoles::new(bus.clone());
        let toasts = NotificationQueue::new(bus.clone(), options.toast_duration);
        let views = DerivedViews::new();
        let refresh = Refresher::spawn(backend.clone(), views.clone(), toasts.clone(), bus.clone());

        let operations = OperationController::new(
            backend.clone(),
            consoles.clone(),
            toasts.clone(),
            refresh.clone(),
            bus.clone(),
        )
        .with_refresh_on_complete(options.refresh_on_complete);

        let session = SessionCoordinator::new(
            backend.clone(),
            consoles.clone(),
            operations.clone(),
            views.clone(),
            refresh.clone(),
            toasts.clone(),
            bus.clone(),
        );
        let settings = Settings::new(backend.clone(), toasts.clone());

        Self {
            backend,
            bus,
            consoles,
            toasts,
            views,
            refresh,
            operations,
            session,
            settings,
        }
    }

    /// Build an HTTP-backed dashboard for `api_url`
    pub fn connect(api_url: &str, config: &Config) -> Result<Self> {
        let backend = HttpBackend::new(
            api_url,
            config.http.connect_timeout,
            config.http.request_timeout,
        )
        .with_context(|| format!("Invalid scan server URL: {}", api_url))?;

        tracing::info!("Using scan server at {}", backend.base_url());
        Ok(Self::new(Arc::new(backend), DashboardOptions::from(config)))
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn consoles(&self) -> &Consoles {
        &self.consoles
    }

    pub fn toasts(&self) -> &NotificationQueue {
        &self.toasts
    }

    pub fn views(&self) -> &DerivedViews {
        &self.views
    }

    pub fn operations(&self) -> &OperationController {
        &self.operations
    }

    pub fn session(&self) -> &SessionCoordinator {
        &self.session
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Active-scope shortcuts
    // ─────────────────────────────────────────────────────────────────────────

    /// Start a scan on the currently selected scope
    pub fn start_scan(
        &self,
        target: &str,
        options: ScanOptions,
    ) -> Result<OperationHandle, OperationError> {
        self.operations
            .start(self.session.active_scope(), target, options)
    }

    /// Stop the scan on the currently selected scope
    pub async fn stop_scan(&self) -> Result<StopOutcome, OperationError> {
        let scope = self.session.active_scope();
        self.operations.stop(&scope).await
    }

    /// Reload derived views for the active scope and wait for the result
    pub async fn refresh(&self) -> &DerivedViews {
        self.refresh_scope(self.session.active_scope()).await
    }

    /// Reload derived views for `scope` and wait for the result
    pub async fn refresh_scope(&self, scope: ScopeKey) -> &DerivedViews {
        self.refresh.refresh(scope).await;
        &self.views
    }

    /// Empty the active scope's console
    pub fn clear_console(&self) -> ScopeKey {
        let scope = self.session.active_scope();
        self.consoles.clear(&scope);
        self.toasts
            .info("Console Cleared", "The scan console has been cleared");
        scope
    }
}
