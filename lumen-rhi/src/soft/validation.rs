//! Execution-time state tracking for the software queue.
//!
//! The queue replays command lists in submission order, so the tracked state of a
//! resource is its actual state at the point each command executes.

use lumen_core::collections::hashmap::HashMap;
use crate::barrier::{ResourceId, ResourceState};
use super::resource::Tracked;

#[derive(Default)]
pub(crate) struct StateTracker {
    states: HashMap<ResourceId, ResourceState>,
}

impl StateTracker {
    /// Current state of `resource`; its creation state if it was never transitioned.
    pub fn state_of(&mut self, resource: &dyn Tracked) -> ResourceState {
        *self.states.entry(resource.id()).or_insert_with(|| resource.initial_state())
    }

    /// Apply a barrier. Returns the state the resource was in, if it disagrees with `before`.
    ///
    /// `Undefined` as `before` discards the contents and matches any state.
    pub fn transition(
        &mut self,
        resource: &dyn Tracked,
        before: ResourceState,
        after: ResourceState,
    ) -> Option<ResourceState> {
        let current = self.state_of(resource);
        self.states.insert(resource.id(), after);
        (before != ResourceState::Undefined && before != current).then_some(current)
    }

    /// Drop the state of a destroyed resource.
    pub fn forget(&mut self, id: ResourceId) {
        self.states.remove(&id);
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }
}
