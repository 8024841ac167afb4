// Events published by the dashboard core
//
// Consoles, the notification queue, the operation controller and the session
// coordinator never touch a renderer directly. They publish these events on a
// broadcast bus; the shell (and the optional JSONL journal) subscribe to it.

use crate::model::{OperationState, ProjectId, ScopeKey};
use crate::toast::{RemovalReason, Toast, ToastId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Default bus capacity; slow subscribers lag rather than block publishers
pub const DEFAULT_BUS_CAPACITY: usize = 1024;

/// Main event type that flows from the core to subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DashboardEvent {
    /// A fully delimited line was appended to a console
    ConsoleLine {
        scope: ScopeKey,
        /// Position of the line in its console (0-based)
        index: usize,
        line: String,
        timestamp: DateTime<Utc>,
    },

    /// A console was emptied
    ConsoleCleared {
        scope: ScopeKey,
        timestamp: DateTime<Utc>,
    },

    /// A toast was queued
    ToastShown { toast: Toast },

    /// A toast left the queue (dismissed or expired)
    ToastRemoved { id: ToastId, reason: RemovalReason },

    /// An operation changed state
    OperationChanged {
        scope: ScopeKey,
        target: String,
        from: OperationState,
        to: OperationState,
        timestamp: DateTime<Utc>,
    },

    /// The current project selection changed
    SelectionChanged {
        previous: Option<ProjectId>,
        current: Option<ProjectId>,
    },

    /// Derived views (stats, recent scans, report lists) were reloaded
    ViewsRefreshed { scope: ScopeKey },
}

/// Broadcast bus shared by every publishing component
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DashboardEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: DashboardEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DashboardEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = DashboardEvent::ConsoleCleared {
            scope: ScopeKey::Global,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "console_cleared");
        assert_eq!(json["scope"], "global");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_harmless() {
        let bus = EventBus::new(4);
        bus.publish(DashboardEvent::ViewsRefreshed {
            scope: ScopeKey::Global,
        });

        let mut rx = bus.subscribe();
        bus.publish(DashboardEvent::ViewsRefreshed {
            scope: ScopeKey::project("7"),
        });
        match rx.recv().await.unwrap() {
            DashboardEvent::ViewsRefreshed { scope } => assert_eq!(scope, ScopeKey::project("7")),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
