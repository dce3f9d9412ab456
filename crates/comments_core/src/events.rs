use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use shared::domain::CommentId;
use tracing::debug;

use crate::{gateway::GatewayError, model::Comment};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    CommentAdded,
    CommentUpdated,
    CommentDeleted,
    /// Targets a parent whose permitted actions depend on its replies.
    ActionBarRefresh,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MutationPhase {
    Optimistic,
    Confirmed,
    RolledBack(GatewayError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommentEvent {
    pub kind: EventKind,
    pub comment_id: CommentId,
    pub phase: MutationPhase,
    /// State after this step; `None` for action bar refreshes and for a
    /// create that was rolled back.
    pub comment: Option<Comment>,
    /// Temporary id a confirmed create replaced.
    pub replaced_id: Option<CommentId>,
}

impl CommentEvent {
    pub(crate) fn new(kind: EventKind, phase: MutationPhase, comment: &Comment) -> Self {
        Self {
            kind,
            comment_id: comment.id.clone(),
            phase,
            comment: Some(comment.clone()),
            replaced_id: None,
        }
    }

    pub(crate) fn without_comment(kind: EventKind, phase: MutationPhase, id: &CommentId) -> Self {
        Self {
            kind,
            comment_id: id.clone(),
            phase,
            comment: None,
            replaced_id: None,
        }
    }

    pub(crate) fn action_bar_refresh(parent_id: &CommentId, phase: MutationPhase) -> Self {
        Self::without_comment(EventKind::ActionBarRefresh, phase, parent_id)
    }

    pub fn is_error(&self) -> bool {
        matches!(self.phase, MutationPhase::RolledBack(_))
    }
}

type Handler = Arc<dyn Fn(&CommentEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: Vec<(u64, EventKind, Handler)>,
}

/// Synchronous publish/subscribe registry. Handlers run on the emitting
/// thread in subscription order, with no lock held.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<Mutex<Registry>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&CommentEvent) + Send + Sync + 'static,
    {
        let mut registry = self.registry.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.handlers.push((id, kind, Arc::new(handler)));
        Subscription {
            id,
            kind,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Handlers registered or removed while an event is being delivered take
    /// effect from the next event on.
    pub fn emit(&self, event: &CommentEvent) {
        let handlers: Vec<Handler> = self
            .registry
            .lock()
            .handlers
            .iter()
            .filter(|(_, kind, _)| *kind == event.kind)
            .map(|(_, _, handler)| Arc::clone(handler))
            .collect();
        debug!(
            kind = ?event.kind,
            comment_id = %event.comment_id,
            phase = ?event.phase,
            handlers = handlers.len(),
            "emitting comment event"
        );
        for handler in handlers {
            handler(event);
        }
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.registry
            .lock()
            .handlers
            .iter()
            .filter(|(_, k, _)| *k == kind)
            .count()
    }
}

/// Handle returned by [`EventBus::subscribe`]. Dropping it keeps the handler
/// registered; call [`Subscription::unsubscribe`] to remove it.
#[must_use = "keep the subscription to be able to unsubscribe"]
pub struct Subscription {
    id: u64,
    kind: EventKind,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn unsubscribe(self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().handlers.retain(|(id, _, _)| *id != self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish()
    }
}

#[cfg(test)]
#[path = "tests/events_tests.rs"]
mod tests;
