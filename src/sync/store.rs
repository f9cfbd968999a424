//! Canonical state store

use super::broadcaster::Broadcaster;
use crate::core::state::AgentState;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::debug;

/// Holds the single canonical `AgentState` and broadcasts every commit
///
/// Replace and fan-out happen under one commit lock, so broadcasts never
/// overlap and subscribers see states in commit order. Readers only take the
/// snapshot lock, which is never held across a broadcast.
pub struct StateStore {
    state: RwLock<AgentState>,
    commit: Mutex<()>,
    broadcaster: Arc<Broadcaster>,
}

impl StateStore {
    pub fn new(initial: AgentState, broadcaster: Arc<Broadcaster>) -> Self {
        Self {
            state: RwLock::new(initial),
            commit: Mutex::new(()),
            broadcaster,
        }
    }

    /// Current snapshot
    pub fn get_state(&self) -> AgentState {
        *self.state.read()
    }

    /// Replace the snapshot and broadcast it
    pub fn set_state(&self, next: AgentState) {
        self.update(|_| next);
    }

    /// Derive the next state from the current one, commit it and broadcast it
    pub fn update(&self, f: impl FnOnce(AgentState) -> AgentState) -> AgentState {
        let _commit = self.commit.lock();
        let next = self.replace(f);
        self.broadcaster.broadcast(&next);
        next
    }

    /// Like `update`, but skips the commit and the broadcast when nothing changes
    pub fn update_if_changed(
        &self,
        f: impl FnOnce(AgentState) -> AgentState,
    ) -> Option<AgentState> {
        let _commit = self.commit.lock();
        let current = self.get_state();
        let next = f(current);
        if next == current {
            return None;
        }
        *self.state.write() = next;
        debug!(state = ?next, "State committed");
        self.broadcaster.broadcast(&next);
        Some(next)
    }

    /// Run `f` on the current state with commits held off
    ///
    /// Whatever `f` does lands entirely before or entirely after the
    /// broadcast of any concurrent commit. `f` must not commit itself.
    pub fn with_committed<R>(&self, f: impl FnOnce(&AgentState) -> R) -> R {
        let _commit = self.commit.lock();
        f(&self.get_state())
    }

    fn replace(&self, f: impl FnOnce(AgentState) -> AgentState) -> AgentState {
        let mut state = self.state.write();
        let next = f(*state);
        *state = next;
        debug!(state = ?next, "State committed");
        next
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }
}
