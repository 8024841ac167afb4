//! Per-scope console buffers
//!
//! A console is an append-only list of rendered lines. Lines only arrive fully
//! delimited (see [`crate::framer`]), are never reordered, and the only other
//! mutation is a full clear. Every append and clear publishes exactly one
//! [`DashboardEvent`], emitted while the registry lock is held so observers see
//! mutations in the order they happened.

use crate::events::{DashboardEvent, EventBus};
use crate::model::ScopeKey;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Ordered lines for one scope key
#[derive(Debug, Clone)]
pub struct ConsoleBuffer {
    scope: ScopeKey,
    lines: Vec<String>,
}

impl ConsoleBuffer {
    pub fn new(scope: ScopeKey) -> Self {
        Self {
            scope,
            lines: Vec::new(),
        }
    }

    pub fn scope(&self) -> &ScopeKey {
        &self.scope
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Append one line and return its index
    pub fn append(&mut self, line: String) -> usize {
        self.lines.push(line);
        self.lines.len() - 1
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }
}

/// Registry of console buffers, one per scope key
///
/// Buffers are created lazily and never removed: a stopped scan's output stays
/// visible when the user comes back to its scope.
#[derive(Clone)]
pub struct Consoles {
    buffers: Arc<Mutex<HashMap<ScopeKey, ConsoleBuffer>>>,
    bus: EventBus,
}

impl Consoles {
    pub fn new(bus: EventBus) -> Self {
        Self {
            buffers: Arc::new(Mutex::new(HashMap::new())),
            bus,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ScopeKey, ConsoleBuffer>> {
        self.buffers.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append a finalized line to the scope's console
    pub fn append(&self, scope: &ScopeKey, line: impl Into<String>) -> usize {
        let line = line.into();
        let mut buffers = self.lock();
        let buffer = buffers
            .entry(scope.clone())
            .or_insert_with(|| ConsoleBuffer::new(scope.clone()));
        let index = buffer.append(line.clone());

        self.bus.publish(DashboardEvent::ConsoleLine {
            scope: scope.clone(),
            index,
            line,
            timestamp: Utc::now(),
        });
        index
    }

    /// Empty the scope's console in one step
    pub fn clear(&self, scope: &ScopeKey) {
        let mut buffers = self.lock();
        buffers
            .entry(scope.clone())
            .or_insert_with(|| ConsoleBuffer::new(scope.clone()))
            .clear();

        self.bus.publish(DashboardEvent::ConsoleCleared {
            scope: scope.clone(),
            timestamp: Utc::now(),
        });
    }

    /// Snapshot of the scope's lines (empty if it never received output)
    pub fn lines(&self, scope: &ScopeKey) -> Vec<String> {
        self.lock()
            .get(scope)
            .map(|b| b.lines().to_vec())
            .unwrap_or_default()
    }

    pub fn len(&self, scope: &ScopeKey) -> usize {
        self.lock().get(scope).map(ConsoleBuffer::len).unwrap_or(0)
    }

    /// Scopes that have a buffer, in stable order
    pub fn scopes(&self) -> Vec<ScopeKey> {
        let mut scopes: Vec<_> = self.lock().keys().cloned().collect();
        scopes.sort();
        scopes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_preserves_order() {
        let consoles = Consoles::new(EventBus::default());
        let scope = ScopeKey::Global;
        assert_eq!(consoles.append(&scope, "one"), 0);
        assert_eq!(consoles.append(&scope, "two"), 1);
        assert_eq!(consoles.lines(&scope), vec!["one", "two"]);
    }

    #[test]
    fn test_scopes_are_independent() {
        let consoles = Consoles::new(EventBus::default());
        consoles.append(&ScopeKey::Global, "global line");
        consoles.append(&ScopeKey::project("1"), "project line");
        consoles.clear(&ScopeKey::Global);

        assert!(consoles.lines(&ScopeKey::Global).is_empty());
        assert_eq!(consoles.lines(&ScopeKey::project("1")), vec!["project line"]);
        assert_eq!(
            consoles.scopes(),
            vec![ScopeKey::Global, ScopeKey::project("1")]
        );
    }

    #[test]
    fn test_unknown_scope_reads_empty() {
        let consoles = Consoles::new(EventBus::default());
        assert!(consoles.lines(&ScopeKey::project("missing")).is_empty());
        assert_eq!(consoles.len(&ScopeKey::project("missing")), 0);
    }

    #[tokio::test]
    async fn test_each_mutation_published_once_in_order() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let consoles = Consoles::new(bus);
        let scope = ScopeKey::project("9");

        consoles.append(&scope, "a");
        consoles.clear(&scope);
        consoles.append(&scope, "b");

        match rx.recv().await.unwrap() {
            DashboardEvent::ConsoleLine { index, line, .. } => {
                assert_eq!((index, line.as_str()), (0, "a"))
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(matches!(
            rx.recv().await.unwrap(),
            DashboardEvent::ConsoleCleared { .. }
        ));
        match rx.recv().await.unwrap() {
            DashboardEvent::ConsoleLine { index, line, .. } => {
                assert_eq!((index, line.as_str()), (0, "b"))
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }
}
