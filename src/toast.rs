//! Toast notification queue
//!
//! Toasts are short-lived and independent of everything else: each one gets
//! its own expiry timer, and an explicit dismissal cancels that timer. Pushing
//! never blocks; the timer runs as a detached tokio task.

use crate::events::{DashboardEvent, EventBus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::AbortHandle;

/// Default lifetime of a toast
pub const DEFAULT_TOAST_DURATION: Duration = Duration::from_millis(2500);

/// Toast identifier, unique per queue
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToastId(pub u64);

impl fmt::Display for ToastId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastKind {
    Info,
    Success,
    Warning,
    Error,
}

impl ToastKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// A queued notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toast {
    pub id: ToastId,
    pub kind: ToastKind,
    pub title: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Why a toast left the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemovalReason {
    Dismissed,
    Expired,
}

#[derive(Default)]
struct QueueInner {
    next_id: u64,
    toasts: Vec<Toast>,
    timers: HashMap<ToastId, AbortHandle>,
}

/// Shared handle to the toast queue
#[derive(Clone)]
pub struct NotificationQueue {
    inner: Arc<Mutex<QueueInner>>,
    duration: Duration,
    bus: EventBus,
}

impl NotificationQueue {
    pub fn new(bus: EventBus, duration: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(QueueInner::default())),
            duration,
            bus,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Queue a toast and start its expiry timer
    pub fn push(
        &self,
        kind: ToastKind,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> ToastId {
        let mut inner = self.lock();
        inner.next_id += 1;
        let toast = Toast {
            id: ToastId(inner.next_id),
            kind,
            title: title.into(),
            message: message.into(),
            created_at: Utc::now(),
        };
        let id = toast.id;

        tracing::debug!(
            "Toast {} [{}] {}: {}",
            id,
            kind.as_str(),
            toast.title,
            toast.message
        );

        inner.toasts.push(toast.clone());

        // Without a runtime the toast simply waits for an explicit dismiss
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let queue = self.clone();
                let duration = self.duration;
                let task = handle.spawn(async move {
                    tokio::time::sleep(duration).await;
                    queue.expire(id);
                });
                inner.timers.insert(id, task.abort_handle());
            }
            Err(_) => tracing::warn!("Toast {} queued outside a runtime; no expiry timer", id),
        }

        self.bus.publish(DashboardEvent::ToastShown { toast });
        id
    }

    pub fn info(&self, title: impl Into<String>, message: impl Into<String>) -> ToastId {
        self.push(ToastKind::Info, title, message)
    }

    pub fn success(&self, title: impl Into<String>, message: impl Into<String>) -> ToastId {
        self.push(ToastKind::Success, title, message)
    }

    pub fn warning(&self, title: impl Into<String>, message: impl Into<String>) -> ToastId {
        self.push(ToastKind::Warning, title, message)
    }

    pub fn error(&self, title: impl Into<String>, message: impl Into<String>) -> ToastId {
        self.push(ToastKind::Error, title, message)
    }

    /// Remove a toast now and cancel its timer. Returns false if already gone.
    pub fn dismiss(&self, id: ToastId) -> bool {
        let mut inner = self.lock();
        if let Some(timer) = inner.timers.remove(&id) {
            timer.abort();
        }
        self.remove_locked(&mut inner, id, RemovalReason::Dismissed)
    }

    /// Timer callback; a no-op when the toast was dismissed first
    fn expire(&self, id: ToastId) {
        let mut inner = self.lock();
        inner.timers.remove(&id);
        self.remove_locked(&mut inner, id, RemovalReason::Expired);
    }

    fn remove_locked(&self, inner: &mut QueueInner, id: ToastId, reason: RemovalReason) -> bool {
        let Some(pos) = inner.toasts.iter().position(|t| t.id == id) else {
            return false;
        };
        inner.toasts.remove(pos);
        self.bus.publish(DashboardEvent::ToastRemoved { id, reason });
        true
    }

    /// Live toasts in insertion order
    pub fn active(&self) -> Vec<Toast> {
        self.lock().toasts.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().toasts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().toasts.is_empty()
    }
}
