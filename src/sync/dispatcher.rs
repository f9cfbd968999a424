//! Command dispatcher
//!
//! Every operation has the same shape: drive the agent, and only if that
//! succeeds fold the outcome into the store in one synchronous step. A failed
//! side effect leaves canonical state untouched.
//!
//! Operations on the same facet of state are serialized: toggle and cycle
//! share the permission lock, model switches and text commands have their
//! own. A lock is held across side effect and commit, so the second caller
//! computes its target from the first caller's committed state.
//!
//! Requests run on their own task. A request that outlives the timeout is
//! reported as `DispatchError::Timeout` but is never cut short halfway
//! through a keystroke burst: it keeps the facet locked until it ends, and
//! if the agent accepted it after all, its outcome is committed then.

use super::store::StateStore;
use crate::core::error::{DispatchError, TransportError};
use crate::core::state::{AgentState, Model, PermissionMode};
use crate::transport::{AgentTransport, ModeTransition};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type Request = JoinHandle<Result<(), TransportError>>;

pub struct CommandDispatcher {
    store: Arc<StateStore>,
    transport: Arc<dyn AgentTransport>,
    timeout: Duration,
    permission_lock: Arc<AsyncMutex<()>>,
    model_lock: Arc<AsyncMutex<()>>,
    text_lock: Arc<AsyncMutex<()>>,
    /// Non-plan mode to return to when toggling out of plan
    prior_mode: Mutex<Option<PermissionMode>>,
    /// Last transition sent to the agent, until the agent shows its target
    settling: Mutex<Option<ModeTransition>>,
}

impl CommandDispatcher {
    pub fn new(
        store: Arc<StateStore>,
        transport: Arc<dyn AgentTransport>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            transport,
            timeout,
            permission_lock: Arc::new(AsyncMutex::new(())),
            model_lock: Arc::new(AsyncMutex::new(())),
            text_lock: Arc::new(AsyncMutex::new(())),
            prior_mode: Mutex::new(None),
            settling: Mutex::new(None),
        }
    }

    /// Flip between plan mode and the mode that was active before it
    pub async fn toggle_permission_mode(self: &Arc<Self>) -> Result<AgentState, DispatchError> {
        let in_flight = self.acquire(&self.permission_lock).await?;

        let from = self.store.get_state().permission_mode;
        let prior = *self.prior_mode.lock();
        let to = if from == PermissionMode::Plan {
            prior.unwrap_or_default()
        } else {
            PermissionMode::Plan
        };
        let transition = ModeTransition::new(from, to);

        *self.settling.lock() = Some(transition);
        let request = self.request(move |transport| async move {
            transport.toggle_permission_mode(transition).await
        });
        self.drive_transition("toggle_permission_mode", transition, request, in_flight)
            .await
    }

    /// Swap the current model for the other one
    pub async fn switch_model(self: &Arc<Self>) -> Result<AgentState, DispatchError> {
        let in_flight = self.acquire(&self.model_lock).await?;

        let model = self.store.get_state().current_model.other();
        let request = self.request(move |transport| async move {
            transport.switch_model(model).await
        });

        let dispatcher = Arc::clone(self);
        let _in_flight = self
            .drive("switch_model", request, in_flight, move |accepted| {
                if accepted {
                    dispatcher.commit_model(model);
                }
            })
            .await?;
        Ok(self.commit_model(model))
    }

    /// Advance one step through the permission-mode cycle, wrapping at the end
    pub async fn cycle_mode(self: &Arc<Self>) -> Result<AgentState, DispatchError> {
        let in_flight = self.acquire(&self.permission_lock).await?;

        let from = self.store.get_state().permission_mode;
        let transition = ModeTransition::new(from, from.next());

        *self.settling.lock() = Some(transition);
        let request = self.request(move |transport| async move {
            transport.cycle_mode(transition).await
        });
        self.drive_transition("cycle_mode", transition, request, in_flight)
            .await
    }

    /// Forward free text to the agent; canonical state is not touched
    pub async fn send_command(&self, text: &str) -> Result<(), DispatchError> {
        if text.trim().is_empty() {
            return Err(DispatchError::EmptyCommand);
        }

        let in_flight = self.acquire(&self.text_lock).await?;
        let text = text.to_string();
        let request = self.request(move |transport| async move {
            transport.send_text(&text).await
        });
        self.drive("send_command", request, in_flight, |_| {})
            .await
            .map(drop)
    }

    /// Remember where a plan toggle should return to
    pub(crate) fn record_transition(&self, from: PermissionMode, to: PermissionMode) {
        if to == PermissionMode::Plan && from != PermissionMode::Plan {
            *self.prior_mode.lock() = Some(from);
        }
    }

    /// Whether a permission mode the agent reported is news
    ///
    /// While the agent works through the last transition its status line
    /// shows every mode between source and target. Those are replays of a
    /// change already accounted for. The target, or any mode off that path,
    /// ends the transition.
    pub(crate) fn screen_reported_mode(&self, reported: PermissionMode, in_flight: bool) -> bool {
        let mut settling = self.settling.lock();
        let Some(transition) = *settling else {
            return true;
        };

        if reported == transition.to {
            *settling = None;
            true
        } else if transition.passes_through(reported) || in_flight {
            debug!("Agent shows {} on the way to {}", reported, transition.to);
            false
        } else {
            *settling = None;
            true
        }
    }

    /// Permission lock, unless a permission-mode operation is in flight
    pub(crate) fn try_lock_permission(&self) -> Option<MutexGuard<'_, ()>> {
        self.permission_lock.try_lock().ok()
    }

    /// Model lock, unless a model switch is in flight
    pub(crate) fn try_lock_model(&self) -> Option<MutexGuard<'_, ()>> {
        self.model_lock.try_lock().ok()
    }

    async fn acquire(
        &self,
        lock: &Arc<AsyncMutex<()>>,
    ) -> Result<OwnedMutexGuard<()>, DispatchError> {
        tokio::time::timeout(self.timeout, Arc::clone(lock).lock_owned())
            .await
            .map_err(|_| {
                warn!("Previous request still running, giving up");
                self.timed_out()
            })
    }

    fn request<F, Fut>(&self, call: F) -> Request
    where
        F: FnOnce(Arc<dyn AgentTransport>) -> Fut,
        Fut: Future<Output = Result<(), TransportError>> + Send + 'static,
    {
        tokio::spawn(call(Arc::clone(&self.transport)))
    }

    async fn drive_transition(
        self: &Arc<Self>,
        op: &'static str,
        transition: ModeTransition,
        request: Request,
        in_flight: OwnedMutexGuard<()>,
    ) -> Result<AgentState, DispatchError> {
        let dispatcher = Arc::clone(self);
        let late = move |accepted: bool| {
            if accepted {
                dispatcher.commit_mode(transition);
            } else {
                dispatcher.end_transition(transition);
            }
        };

        match self.drive(op, request, in_flight, late).await {
            Ok(_in_flight) => Ok(self.commit_mode(transition)),
            Err(e @ DispatchError::Timeout(_)) => Err(e),
            Err(e) => {
                self.end_transition(transition);
                Err(e)
            }
        }
    }

    /// Wait for `request` up to the timeout
    ///
    /// On success the facet lock is handed back for the commit. On timeout
    /// the request keeps running with the lock, and `late` learns whether
    /// the agent accepted it in the end.
    async fn drive(
        &self,
        op: &'static str,
        mut request: Request,
        in_flight: OwnedMutexGuard<()>,
        late: impl FnOnce(bool) + Send + 'static,
    ) -> Result<OwnedMutexGuard<()>, DispatchError> {
        debug!("Dispatching {}", op);
        match tokio::time::timeout(self.timeout, &mut request).await {
            Ok(Ok(Ok(()))) => Ok(in_flight),
            Ok(Ok(Err(e))) => {
                warn!("{} failed, state unchanged: {}", op, e);
                Err(e.into())
            }
            Ok(Err(e)) => {
                warn!("{} interrupted, state unchanged: {}", op, e);
                Err(DispatchError::Interrupted(e.to_string()))
            }
            Err(_) => {
                warn!("{} timed out, state unchanged for now", op);
                tokio::spawn(async move {
                    let accepted = matches!(request.await, Ok(Ok(())));
                    if accepted {
                        info!("{} completed after timing out", op);
                    }
                    late(accepted);
                    drop(in_flight);
                });
                Err(self.timed_out())
            }
        }
    }

    fn timed_out(&self) -> DispatchError {
        DispatchError::Timeout(self.timeout.as_millis() as u64)
    }

    fn commit_mode(&self, transition: ModeTransition) -> AgentState {
        self.record_transition(transition.from, transition.to);
        let next = self
            .store
            .update(|state| state.with_permission_mode(transition.to));
        info!("Permission mode {} -> {}", transition.from, transition.to);
        next
    }

    fn commit_model(&self, model: Model) -> AgentState {
        let next = self.store.update(|state| state.with_model(model));
        info!("Model switched to {}", model);
        next
    }

    fn end_transition(&self, transition: ModeTransition) {
        let mut settling = self.settling.lock();
        if *settling == Some(transition) {
            *settling = None;
        }
    }
}
