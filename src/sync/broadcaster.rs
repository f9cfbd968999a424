//! Subscription broadcaster
//!
//! Observer registry keyed by binding id. Fan-out runs under the registry's
//! read lock, so `subscribe`/`unsubscribe` wait for an in-flight broadcast to
//! finish: once `unsubscribe` returns, that callback is never invoked again,
//! and a subscriber added mid-broadcast does not receive it.

use crate::core::error::NotifyError;
use crate::core::state::AgentState;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Stable identifier of one control instance (physical key slot)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingId(String);

impl BindingId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BindingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BindingId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Logical group of bindings (one per control kind), reference counted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingGroup(pub &'static str);

impl fmt::Display for BindingGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Callback invoked with every new canonical state
pub type NotifyFn = Arc<dyn Fn(&AgentState) -> Result<(), NotifyError> + Send + Sync>;

/// Outcome of a registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// First subscriber of its group
    GroupActivated,
    /// Group already had subscribers
    Joined,
    /// Replaced an existing subscription for the same binding id
    Replaced,
}

/// Outcome of an unregistration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// Binding id was not registered
    NotRegistered,
    /// Removed; other bindings of the group remain
    Removed,
    /// Removed the last binding of its group
    GroupReleased(BindingGroup),
}

struct Subscription {
    group: BindingGroup,
    generation: u64,
    notify: NotifyFn,
}

#[derive(Default)]
struct Registry {
    subscribers: HashMap<BindingId, Subscription>,
    groups: HashMap<BindingGroup, usize>,
}

impl Registry {
    fn leave_group(&mut self, group: BindingGroup) -> Release {
        match self.groups.get_mut(&group) {
            Some(count) if *count > 1 => {
                *count -= 1;
                Release::Removed
            }
            _ => {
                self.groups.remove(&group);
                Release::GroupReleased(group)
            }
        }
    }
}

/// Fans canonical state out to every registered binding
#[derive(Default)]
pub struct Broadcaster {
    registry: RwLock<Registry>,
    next_generation: AtomicU64,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace the callback for `binding_id`
    pub fn subscribe(
        &self,
        binding_id: BindingId,
        group: BindingGroup,
        notify: NotifyFn,
    ) -> Registration {
        self.insert(binding_id, group, notify).0
    }

    fn insert(
        &self,
        binding_id: BindingId,
        group: BindingGroup,
        notify: NotifyFn,
    ) -> (Registration, u64) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let mut registry = self.registry.write();

        let previous = registry.subscribers.insert(
            binding_id.clone(),
            Subscription {
                group,
                generation,
                notify,
            },
        );

        let registration = match previous {
            Some(old) if old.group == group => Registration::Replaced,
            Some(old) => {
                // Binding switched kind: move it between groups
                registry.leave_group(old.group);
                Self::join_group(&mut registry, group)
            }
            None => Self::join_group(&mut registry, group),
        };

        debug!(
            "Subscribed {} ({}): {:?}, {} subscriber(s)",
            binding_id,
            group,
            registration,
            registry.subscribers.len()
        );
        (registration, generation)
    }

    fn join_group(registry: &mut Registry, group: BindingGroup) -> Registration {
        let count = registry.groups.entry(group).or_insert(0);
        *count += 1;
        if *count == 1 {
            Registration::GroupActivated
        } else {
            Registration::Joined
        }
    }

    /// Register with a guard that unregisters when dropped
    pub fn subscribe_scoped(
        self: &Arc<Self>,
        binding_id: BindingId,
        group: BindingGroup,
        notify: NotifyFn,
    ) -> (SubscriptionGuard, Registration) {
        let (registration, generation) = self.insert(binding_id.clone(), group, notify);
        let guard = SubscriptionGuard {
            broadcaster: Arc::downgrade(self),
            binding_id,
            generation,
            released: false,
        };
        (guard, registration)
    }

    /// Remove the callback for `binding_id`; no-op if absent
    pub fn unsubscribe(&self, binding_id: &BindingId) -> Release {
        self.remove_if(binding_id, None)
    }

    fn remove_if(&self, binding_id: &BindingId, generation: Option<u64>) -> Release {
        let mut registry = self.registry.write();

        let matches = match (registry.subscribers.get(binding_id), generation) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(sub), Some(generation)) => sub.generation == generation,
        };
        if !matches {
            return Release::NotRegistered;
        }

        let release = match registry.subscribers.remove(binding_id) {
            Some(sub) => registry.leave_group(sub.group),
            None => Release::NotRegistered,
        };

        debug!(
            "Unsubscribed {}: {:?}, {} subscriber(s) left",
            binding_id,
            release,
            registry.subscribers.len()
        );
        release
    }

    /// Deliver `state` to every registered subscriber
    ///
    /// Errors and panics inside a callback are logged and never stop delivery
    /// to the remaining subscribers. Returns the number of callbacks invoked.
    pub fn broadcast(&self, state: &AgentState) -> usize {
        let registry = self.registry.read();

        for (binding_id, sub) in registry.subscribers.iter() {
            match catch_unwind(AssertUnwindSafe(|| (sub.notify)(state))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Subscriber {} failed: {}", binding_id, e),
                Err(_) => warn!("Subscriber {} panicked during broadcast", binding_id),
            }
        }

        registry.subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.read().subscribers.len()
    }

    pub fn is_subscribed(&self, binding_id: &BindingId) -> bool {
        self.registry.read().subscribers.contains_key(binding_id)
    }

    /// Whether any binding is listening for state changes
    pub fn is_listening(&self) -> bool {
        !self.registry.read().groups.is_empty()
    }

    /// Groups with at least one subscriber, sorted
    pub fn active_groups(&self) -> Vec<BindingGroup> {
        let mut groups: Vec<_> = self.registry.read().groups.keys().copied().collect();
        groups.sort();
        groups
    }

    /// Number of bindings registered in `group`
    pub fn group_count(&self, group: BindingGroup) -> usize {
        self.registry.read().groups.get(&group).copied().unwrap_or(0)
    }
}

/// Scoped registration; unregisters on drop unless the id was re-registered since
pub struct SubscriptionGuard {
    broadcaster: Weak<Broadcaster>,
    binding_id: BindingId,
    generation: u64,
    released: bool,
}

impl SubscriptionGuard {
    pub fn binding_id(&self) -> &BindingId {
        &self.binding_id
    }

    /// Unregister now and report the outcome
    pub fn release(mut self) -> Release {
        self.release_inner()
    }

    fn release_inner(&mut self) -> Release {
        if self.released {
            return Release::NotRegistered;
        }
        self.released = true;
        match self.broadcaster.upgrade() {
            Some(broadcaster) => broadcaster.remove_if(&self.binding_id, Some(self.generation)),
            None => Release::NotRegistered,
        }
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.release_inner();
    }
}
