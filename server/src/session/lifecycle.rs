//! Ordered record of state hook invocations.
//!
//! Attach a [`LifecycleLog`] to the server context to observe exactly when
//! each session entered, exited and cleaned up a state.

use std::sync::{Mutex, PoisonError};
use towber_protocol::{ClientId, SessionPhase};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    Enter,
    Exit,
    Cleanup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleEvent {
    /// Session id at the time of the hook. Changes at login.
    pub client: ClientId,
    pub hook: Hook,
    pub phase: SessionPhase,
}

#[derive(Debug, Default)]
pub struct LifecycleLog {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl LifecycleLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, client: ClientId, hook: Hook, phase: SessionPhase) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(LifecycleEvent { client, hook, phase });
    }

    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Hooks recorded under any of the given ids, in order.
    pub fn hooks_for(&self, ids: &[ClientId]) -> Vec<(Hook, SessionPhase)> {
        self.events()
            .into_iter()
            .filter(|event| ids.contains(&event.client))
            .map(|event| (event.hook, event.phase))
            .collect()
    }
}
