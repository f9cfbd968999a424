//! Binding lifecycle - one adapter per visible control
//!
//! A binding renders a snapshot when its control appears, then follows
//! canonical state through a broadcaster subscription until it disappears.
//! Key presses run exactly one sync operation, acknowledged on the control.
//! Failures of display calls or of the operation stay inside the binding.

mod action;

pub use action::{Action, ControlKind, Face, Titled, Toggle};

use crate::core::config::SurfaceConfig;
use crate::core::error::{DispatchError, NotifyError, SurfaceError};
use crate::core::events::SurfaceEvent;
use crate::core::state::AgentState;
use crate::surface::Surface;
use crate::sync::{
    AgentSync, BindingGroup, BindingId, NotifyFn, Registration, Release, SubscriptionGuard,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Per-binding settings taken from `SurfaceConfig`
#[derive(Debug, Clone)]
pub struct BindingSettings {
    pub ack_timeout: Duration,
    pub default_command_label: String,
}

impl From<&SurfaceConfig> for BindingSettings {
    fn from(config: &SurfaceConfig) -> Self {
        Self {
            ack_timeout: Duration::from_millis(config.ack_timeout_ms),
            default_command_label: config.default_command_label.clone(),
        }
    }
}

impl Default for BindingSettings {
    fn default() -> Self {
        Self::from(&SurfaceConfig::default())
    }
}

/// Outcome of a key press, as acknowledged on the control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    Ok,
    Failed,
    TimedOut,
}

struct Subscribed {
    guard: SubscriptionGuard,
    render_task: JoinHandle<()>,
}

/// Adapter between one control instance and the sync layer
pub struct Binding {
    id: BindingId,
    action: Action,
    kind: ControlKind,
    sync: Arc<AgentSync>,
    surface: Arc<dyn Surface>,
    settings: BindingSettings,
    subscribed: Mutex<Option<Subscribed>>,
}

impl Binding {
    pub fn new(
        id: BindingId,
        action: Action,
        sync: Arc<AgentSync>,
        surface: Arc<dyn Surface>,
        settings: BindingSettings,
    ) -> Self {
        let kind = action.kind();
        Self {
            id,
            action,
            kind,
            sync,
            surface,
            settings,
            subscribed: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &BindingId {
        &self.id
    }

    pub fn action(&self) -> &Action {
        &self.action
    }

    pub fn group(&self) -> BindingGroup {
        self.action.group()
    }

    /// Control became visible: render the current snapshot, then subscribe
    pub async fn on_appear(&self) -> Registration {
        let snapshot = self.sync.get_state();
        render(&*self.surface, &self.id, &self.kind, &self.settings, &snapshot).await;

        let (tx, rx) = mpsc::unbounded_channel::<AgentState>();
        let notify: NotifyFn = Arc::new(move |state: &AgentState| {
            tx.send(*state).map_err(|_| NotifyError::Closed)
        });
        let (guard, registration) =
            self.sync
                .subscribe_scoped(self.id.clone(), self.group(), notify.clone());

        // A commit between snapshot and subscribe would otherwise be missed.
        // Held against commits so a newer broadcast cannot queue ahead of it.
        self.sync.store().with_committed(|current| {
            if *current != snapshot {
                let _ = notify(current);
            }
        });

        let render_task = tokio::spawn(render_loop(
            rx,
            Arc::clone(&self.surface),
            self.id.clone(),
            self.kind.clone(),
            self.settings.clone(),
        ));

        if let Some(previous) = self.subscribed.lock().replace(Subscribed { guard, render_task }) {
            previous.render_task.abort();
        }

        debug!("Binding {} appeared ({:?})", self.id, registration);
        registration
    }

    /// Control became invisible: unsubscribe and stop rendering
    pub fn on_disappear(&self) -> Release {
        let Some(subscribed) = self.subscribed.lock().take() else {
            return Release::NotRegistered;
        };
        let release = subscribed.guard.release();
        subscribed.render_task.abort();

        debug!("Binding {} disappeared ({:?})", self.id, release);
        release
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed.lock().is_some()
    }

    /// Control pressed: run one operation and acknowledge it
    ///
    /// Sync operations run detached, so timing out here only stops waiting.
    /// The operation still commits if the agent accepts it.
    pub async fn on_key_down(&self) -> KeyOutcome {
        let outcome = match tokio::time::timeout(self.settings.ack_timeout, self.invoke()).await {
            Ok(Ok(())) => KeyOutcome::Ok,
            Ok(Err(e)) => {
                warn!("Binding {} ({:?}) failed: {}", self.id, self.action, e);
                KeyOutcome::Failed
            }
            Err(_) => {
                warn!("Binding {} ({:?}) timed out", self.id, self.action);
                KeyOutcome::TimedOut
            }
        };

        let ack = match outcome {
            KeyOutcome::Ok => self.surface.show_ok(&self.id).await,
            KeyOutcome::Failed | KeyOutcome::TimedOut => self.surface.show_alert(&self.id).await,
        };
        contain(&self.id, "acknowledge", ack);

        outcome
    }

    async fn invoke(&self) -> Result<(), DispatchError> {
        match &self.action {
            Action::TogglePlan => self.sync.toggle_permission_mode().await.map(|_| ()),
            Action::CycleMode | Action::YoloIndicator => self.sync.cycle_mode().await.map(|_| ()),
            Action::SwitchModel => self.sync.switch_model().await.map(|_| ()),
            Action::SendCommand { text, .. } => self.sync.send_command(text).await,
        }
    }
}

impl Drop for Binding {
    fn drop(&mut self) {
        if let Some(subscribed) = self.subscribed.get_mut().take() {
            subscribed.render_task.abort();
        }
    }
}

/// Render every state the subscription delivers, skipping stale ones
async fn render_loop(
    mut rx: mpsc::UnboundedReceiver<AgentState>,
    surface: Arc<dyn Surface>,
    id: BindingId,
    kind: ControlKind,
    settings: BindingSettings,
) {
    while let Some(mut state) = rx.recv().await {
        while let Ok(newer) = rx.try_recv() {
            state = newer;
        }
        render(&*surface, &id, &kind, &settings, &state).await;
    }
}

async fn render(
    surface: &dyn Surface,
    id: &BindingId,
    kind: &ControlKind,
    settings: &BindingSettings,
    state: &AgentState,
) {
    let face = kind.face(state, &settings.default_command_label);

    contain(id, "set_title", surface.set_title(id, &face.title).await);
    contain(id, "set_image", surface.set_image(id, &face.image).await);
    if let Some(index) = face.state {
        contain(id, "set_state", surface.set_state(id, index).await);
    }
}

fn contain(id: &BindingId, op: &str, result: Result<(), SurfaceError>) {
    if let Err(e) = result {
        warn!("Display update {} for {} failed: {}", op, id, e);
    }
}

/// Routes surface events to bindings by id
pub struct BindingManager {
    sync: Arc<AgentSync>,
    surface: Arc<dyn Surface>,
    settings: BindingSettings,
    bindings: HashMap<BindingId, Arc<Binding>>,
}

impl BindingManager {
    pub fn new(sync: Arc<AgentSync>, surface: Arc<dyn Surface>, settings: BindingSettings) -> Self {
        Self {
            sync,
            surface,
            settings,
            bindings: HashMap::new(),
        }
    }

    /// Handle one surface event
    ///
    /// Appear and disappear complete before this returns, so later events
    /// for the same control see the registration. Key presses run on their
    /// own task and their handle is returned.
    pub async fn handle_event(&mut self, event: SurfaceEvent) -> Option<JoinHandle<KeyOutcome>> {
        match event {
            SurfaceEvent::Appear { binding, action } => {
                self.appear(binding, action).await;
                None
            }
            SurfaceEvent::Disappear { binding } => {
                self.disappear(&binding);
                None
            }
            SurfaceEvent::KeyDown { binding } => self.key_down(&binding),
        }
    }

    pub async fn appear(&mut self, id: BindingId, action: Action) -> Registration {
        if let Some(previous) = self.bindings.remove(&id) {
            previous.on_disappear();
        }

        let binding = Arc::new(Binding::new(
            id.clone(),
            action,
            Arc::clone(&self.sync),
            Arc::clone(&self.surface),
            self.settings.clone(),
        ));
        let registration = binding.on_appear().await;
        if registration == Registration::GroupActivated {
            info!("First {} control visible", binding.group());
        }
        self.bindings.insert(id, binding);
        registration
    }

    pub fn disappear(&mut self, id: &BindingId) -> Release {
        let Some(binding) = self.bindings.remove(id) else {
            debug!("Disappear for unknown binding {}", id);
            return Release::NotRegistered;
        };

        let release = binding.on_disappear();
        if let Release::GroupReleased(group) = release {
            info!("Last {} control gone, group released", group);
            if !self.sync.broadcaster().is_listening() {
                info!("No controls visible, stopped listening for state changes");
            }
        }
        release
    }

    pub fn key_down(&self, id: &BindingId) -> Option<JoinHandle<KeyOutcome>> {
        let Some(binding) = self.bindings.get(id).cloned() else {
            warn!("Key press for unknown binding {}", id);
            return None;
        };
        Some(tokio::spawn(async move { binding.on_key_down().await }))
    }

    /// Tear down every binding
    pub fn clear(&mut self) {
        let ids: Vec<_> = self.bindings.keys().cloned().collect();
        for id in ids {
            self.disappear(&id);
        }
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
