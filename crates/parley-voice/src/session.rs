//! Per-session orchestrators for a server hosting many conversations.

use crate::orchestrator::{ConversationEvent, TurnOrchestrator};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

/// Session id -> orchestrator. Each session owns its own history and state.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<TurnOrchestrator>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the session's orchestrator, creating it with `make` on first use.
    ///
    /// The event receiver is handed back only by the call that created the
    /// session; later calls get `None`.
    pub fn get_or_insert_with<F>(
        &self,
        session_id: &str,
        make: F,
    ) -> (
        Arc<TurnOrchestrator>,
        Option<mpsc::UnboundedReceiver<ConversationEvent>>,
    )
    where
        F: FnOnce() -> (TurnOrchestrator, mpsc::UnboundedReceiver<ConversationEvent>),
    {
        match self.sessions.entry(session_id.to_string()) {
            Entry::Occupied(existing) => (Arc::clone(existing.get()), None),
            Entry::Vacant(slot) => {
                let (orchestrator, events) = make();
                let orchestrator = Arc::new(orchestrator);
                slot.insert(Arc::clone(&orchestrator));
                info!("🎭 Session {} created", session_id);
                (orchestrator, Some(events))
            }
        }
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<TurnOrchestrator>> {
        self.sessions.get(session_id).map(|s| Arc::clone(s.value()))
    }

    pub fn remove(&self, session_id: &str) -> Option<Arc<TurnOrchestrator>> {
        let removed = self.sessions.remove(session_id).map(|(_, s)| s);
        if removed.is_some() {
            info!("Session {} removed", session_id);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
