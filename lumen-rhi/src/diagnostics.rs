//! Counters and findings reported by the backend while it executes submitted work.

use crate::barrier::ResourceId;
use crate::command::CommandListId;

/// Work executed by the device queue so far.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub command_lists: u64,
    pub draws: u64,
    /// Vertices or indices times instances over all draws.
    pub vertices: u64,
    pub dispatches: u64,
    pub thread_groups: u64,
    pub copies: u64,
    pub barriers: u64,
    pub render_passes: u64,
    pub presents: u64,
    pub fence_signals: u64,
    /// Live resources the validation layer holds a state for. A gauge, not a counter.
    pub tracked_resources: u64,
}

/// Counters saturate instead of wrapping. `tracked_resources` is left alone.
impl std::ops::AddAssign for QueueStats {
    fn add_assign(&mut self, rhs: Self) {
        self.command_lists = self.command_lists.saturating_add(rhs.command_lists);
        self.draws = self.draws.saturating_add(rhs.draws);
        self.vertices = self.vertices.saturating_add(rhs.vertices);
        self.dispatches = self.dispatches.saturating_add(rhs.dispatches);
        self.thread_groups = self.thread_groups.saturating_add(rhs.thread_groups);
        self.copies = self.copies.saturating_add(rhs.copies);
        self.barriers = self.barriers.saturating_add(rhs.barriers);
        self.render_passes = self.render_passes.saturating_add(rhs.render_passes);
        self.presents = self.presents.saturating_add(rhs.presents);
        self.fence_signals = self.fence_signals.saturating_add(rhs.fence_signals);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValidationKind {
    /// A barrier's `before` state disagrees with the state the resource is actually in.
    BarrierStateMismatch,
    /// A render pass attachment is not in `RenderTarget`/`DepthWrite`/`DepthRead`.
    AttachmentState,
    /// A copy source or destination is not in `CopySource`/`CopyDest`.
    CopyState,
    /// A copy or index range exceeds a resource.
    OutOfBounds,
    /// A resource bound for a draw or dispatch is in an incompatible state.
    BindingState,
    /// A draw or dispatch executed without a matching pipeline, viewport or index buffer.
    MissingState,
    /// A back buffer was presented outside `Present` state.
    PresentState,
}

/// One finding of the backend validation layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationMessage {
    pub kind: ValidationKind,
    /// List being executed, `None` for queue-level operations such as present.
    pub command_list: Option<CommandListId>,
    pub resource: Option<ResourceId>,
    pub message: String,
}

impl std::fmt::Display for ValidationMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.kind, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_saturate() {
        let mut stats = QueueStats { thread_groups: u64::MAX - 1, tracked_resources: 3, ..Default::default() };
        stats += QueueStats { thread_groups: 5, dispatches: 1, tracked_resources: 9, ..Default::default() };
        assert_eq!(stats.thread_groups, u64::MAX);
        assert_eq!(stats.dispatches, 1);
        assert_eq!(stats.tracked_resources, 3);
    }
}
