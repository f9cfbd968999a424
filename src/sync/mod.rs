//! Agent state synchronization layer
//!
//! `AgentSync` is constructed once in `main` and handed to every binding.
//! It owns the canonical store, the broadcaster and the dispatcher; all
//! state changes go through its operations or through `apply_report`.

pub mod broadcaster;
pub mod dispatcher;
pub mod store;

pub use broadcaster::{
    BindingGroup, BindingId, Broadcaster, NotifyFn, Registration, Release, SubscriptionGuard,
};
pub use dispatcher::CommandDispatcher;
pub use store::StateStore;

use crate::core::error::DispatchError;
use crate::core::state::AgentState;
use crate::report::StateReport;
use crate::transport::AgentTransport;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub struct AgentSync {
    broadcaster: Arc<Broadcaster>,
    store: Arc<StateStore>,
    dispatcher: Arc<CommandDispatcher>,
}

impl AgentSync {
    pub fn new(
        initial: AgentState,
        transport: Arc<dyn AgentTransport>,
        command_timeout: Duration,
    ) -> Self {
        let broadcaster = Arc::new(Broadcaster::new());
        let store = Arc::new(StateStore::new(initial, Arc::clone(&broadcaster)));
        let dispatcher = Arc::new(CommandDispatcher::new(
            Arc::clone(&store),
            transport,
            command_timeout,
        ));
        Self {
            broadcaster,
            store,
            dispatcher,
        }
    }

    pub fn get_state(&self) -> AgentState {
        self.store.get_state()
    }

    pub fn subscribe(
        &self,
        binding_id: BindingId,
        group: BindingGroup,
        notify: NotifyFn,
    ) -> Registration {
        self.broadcaster.subscribe(binding_id, group, notify)
    }

    pub fn subscribe_scoped(
        &self,
        binding_id: BindingId,
        group: BindingGroup,
        notify: NotifyFn,
    ) -> (SubscriptionGuard, Registration) {
        self.broadcaster.subscribe_scoped(binding_id, group, notify)
    }

    pub fn unsubscribe(&self, binding_id: &BindingId) -> Release {
        self.broadcaster.unsubscribe(binding_id)
    }

    // Operations run detached: a caller that stops waiting (a key handler
    // timing out) cannot stop one between side effect and commit.

    pub async fn toggle_permission_mode(&self) -> Result<AgentState, DispatchError> {
        let dispatcher = Arc::clone(&self.dispatcher);
        detach(async move { dispatcher.toggle_permission_mode().await }).await
    }

    pub async fn switch_model(&self) -> Result<AgentState, DispatchError> {
        let dispatcher = Arc::clone(&self.dispatcher);
        detach(async move { dispatcher.switch_model().await }).await
    }

    pub async fn cycle_mode(&self) -> Result<AgentState, DispatchError> {
        let dispatcher = Arc::clone(&self.dispatcher);
        detach(async move { dispatcher.cycle_mode().await }).await
    }

    pub async fn send_command(&self, text: &str) -> Result<(), DispatchError> {
        let dispatcher = Arc::clone(&self.dispatcher);
        let text = text.to_string();
        detach(async move { dispatcher.send_command(&text).await }).await
    }

    /// Fold state the agent reported about itself into canonical state
    ///
    /// A facet whose dispatcher operation is in flight is skipped: the
    /// agent's output mid-transition shows intermediate modes, and the
    /// operation's own commit follows. For the same reason, modes the agent
    /// passes through on the way to the last committed target are skipped
    /// even when they arrive late. Broadcasts only if something changed.
    pub fn apply_report(&self, report: StateReport) -> Option<AgentState> {
        let permission_guard = report
            .permission_mode
            .and_then(|_| self.dispatcher.try_lock_permission());
        let model_guard = report.model.and_then(|_| self.dispatcher.try_lock_model());

        let in_flight = permission_guard.is_none();
        let effective = StateReport {
            permission_mode: report
                .permission_mode
                .filter(|&mode| self.dispatcher.screen_reported_mode(mode, in_flight))
                .filter(|_| !in_flight),
            model: report.model.filter(|_| model_guard.is_some()),
        };
        if effective != report {
            debug!("Ignoring reported facets in flight or replayed: {:?}", report);
        }
        if effective.is_empty() {
            return None;
        }

        let before = self.store.get_state();
        let next = self.store.update_if_changed(|state| effective.apply(state))?;
        self.dispatcher
            .record_transition(before.permission_mode, next.permission_mode);
        info!(state = ?next, "Agent reported state");
        Some(next)
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }
}

/// Run an operation on its own task and wait for it
async fn detach<T, F>(operation: F) -> Result<T, DispatchError>
where
    T: Send + 'static,
    F: Future<Output = Result<T, DispatchError>> + Send + 'static,
{
    tokio::spawn(operation)
        .await
        .map_err(|e| DispatchError::Interrupted(e.to_string()))?
}
