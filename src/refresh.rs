//! Derived-view refresher
//!
//! Dashboard summaries (stats, recent scans, report lists) are derived from
//! backend state and go stale whenever a scan finishes or a report changes.
//! Refresh requests are queued to a single worker task and handled strictly
//! one at a time, so two refreshes never race to write the same cache entry.
//!
//! A failed fetch is a real error: the view is left empty and an error toast
//! is raised. Nothing is ever filled in with placeholder data.

use crate::api::Backend;
use crate::events::{DashboardEvent, EventBus};
use crate::model::{Report, ScanRecord, ScopeKey, Stats};
use crate::toast::NotificationQueue;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, oneshot};

/// How many recent scans the dashboard shows
pub const RECENT_SCANS_LIMIT: usize = 3;

#[derive(Debug, Default)]
struct ViewState {
    stats: Option<Stats>,
    recent_scans: Vec<ScanRecord>,
    reports: HashMap<ScopeKey, Vec<Report>>,
}

/// Cached derived views, written only by the refresh worker
#[derive(Clone, Default)]
pub struct DerivedViews {
    inner: Arc<Mutex<ViewState>>,
}

impl DerivedViews {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ViewState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Latest stats, `None` until loaded or after a failed load
    pub fn stats(&self) -> Option<Stats> {
        self.lock().stats
    }

    pub fn recent_scans(&self) -> Vec<ScanRecord> {
        self.lock().recent_scans.clone()
    }

    pub fn reports(&self, scope: &ScopeKey) -> Vec<Report> {
        self.lock().reports.get(scope).cloned().unwrap_or_default()
    }
}

struct RefreshRequest {
    scope: ScopeKey,
    done: Option<oneshot::Sender<()>>,
}

/// Handle used to queue refreshes
#[derive(Clone)]
pub struct RefreshHandle {
    tx: mpsc::UnboundedSender<RefreshRequest>,
}

impl RefreshHandle {
    /// Queue a refresh for `scope` without waiting for it
    pub fn schedule(&self, scope: ScopeKey) {
        tracing::debug!("Refresh scheduled for {}", scope);
        if self.tx.send(RefreshRequest { scope, done: None }).is_err() {
            tracing::warn!("Refresh worker is gone; request dropped");
        }
    }

    /// Queue a refresh and wait until the worker has handled it
    pub async fn refresh(&self, scope: ScopeKey) {
        let (done, rx) = oneshot::channel();
        let request = RefreshRequest {
            scope,
            done: Some(done),
        };
        if self.tx.send(request).is_err() {
            tracing::warn!("Refresh worker is gone; request dropped");
            return;
        }
        let _ = rx.await;
    }
}

/// Serial refresh worker
pub struct Refresher {
    backend: Arc<dyn Backend>,
    views: DerivedViews,
    toasts: NotificationQueue,
    bus: EventBus,
    rx: mpsc::UnboundedReceiver<RefreshRequest>,
}

impl Refresher {
    /// Start the worker on the current runtime and return its handle
    ///
    /// The worker stops once every handle has been dropped.
    pub fn spawn(
        backend: Arc<dyn Backend>,
        views: DerivedViews,
        toasts: NotificationQueue,
        bus: EventBus,
    ) -> RefreshHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = Self {
            backend,
            views,
            toasts,
            bus,
            rx,
        };
        tokio::spawn(worker.run());
        RefreshHandle { tx }
    }

    async fn run(mut self) {
        tracing::debug!("Refresh worker started ({})", self.backend.name());

        while let Some(request) = self.rx.recv().await {
            self.refresh(&request.scope).await;
            if let Some(done) = request.done {
                let _ = done.send(());
            }
        }

        tracing::debug!("Refresh worker stopped");
    }

    async fn refresh(&self, scope: &ScopeKey) {
        match scope {
            ScopeKey::Global => {
                self.refresh_stats().await;
                self.refresh_recent_scans().await;
            }
            ScopeKey::Project(_) => self.refresh_stats().await,
        }
        self.refresh_reports(scope).await;
        self.bus.publish(DashboardEvent::ViewsRefreshed {
            scope: scope.clone(),
        });
    }

    async fn refresh_stats(&self) {
        let stats = match self.backend.stats().await {
            Ok(stats) => Some(stats),
            Err(e) => {
                tracing::warn!("Stats refresh failed: {}", e);
                self.toasts
                    .error("Error", e.user_message("Failed to update statistics"));
                None
            }
        };
        self.views.lock().stats = stats;
    }

    async fn refresh_recent_scans(&self) {
        let scans = match self.backend.recent_scans().await {
            Ok(mut scans) => {
                scans.truncate(RECENT_SCANS_LIMIT);
                scans
            }
            Err(e) => {
                tracing::warn!("Recent scans refresh failed: {}", e);
                self.toasts
                    .error("Error", e.user_message("Failed to load recent scans"));
                Vec::new()
            }
        };
        self.views.lock().recent_scans = scans;
    }

    async fn refresh_reports(&self, scope: &ScopeKey) {
        let reports = match self.backend.list_reports(scope).await {
            Ok(reports) => reports,
            Err(e) => {
                tracing::warn!("Report list refresh for {} failed: {}", scope, e);
                self.toasts
                    .error("Error", e.user_message("Failed to load reports"));
                Vec::new()
            }
        };
        self.views.lock().reports.insert(scope.clone(), reports);
    }
}
