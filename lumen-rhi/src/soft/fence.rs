use std::any::Any;
use std::sync::{Arc, Weak};
use parking_lot::{Condvar, Mutex};
use lumen_core::log;
use crate::error::{RhiError, RhiResult};
use crate::synchronization::Fence;

#[derive(Debug, Default)]
struct Timeline {
    value: u64,
    /// The queue that signals this fence is gone; unreached values never will be.
    lost: bool,
}

/// Timeline shared between the queue thread and waiters.
#[derive(Debug)]
pub(crate) struct FenceState {
    timeline: Mutex<Timeline>,
    reached: Condvar,
}

impl FenceState {
    pub fn new(initial_value: u64) -> Self {
        Self {
            timeline: Mutex::new(Timeline { value: initial_value, lost: false }),
            reached: Condvar::new(),
        }
    }

    pub fn completed(&self) -> u64 {
        self.timeline.lock().value
    }

    pub fn signal(&self, value: u64) {
        let mut timeline = self.timeline.lock();
        if value > timeline.value {
            timeline.value = value;
            self.reached.notify_all();
        } else if value < timeline.value {
            log::trace!("Ignoring fence signal {} below completed value {}", value, timeline.value);
        }
    }

    /// Block until the fence reaches `value`, or fail once the signalling queue is lost.
    pub fn wait(&self, value: u64) -> RhiResult<()> {
        let mut timeline = self.timeline.lock();
        while timeline.value < value {
            if timeline.lost {
                return Err(RhiError::DeviceLost);
            }
            self.reached.wait(&mut timeline);
        }
        Ok(())
    }

    pub fn mark_lost(&self) {
        self.timeline.lock().lost = true;
        self.reached.notify_all();
    }
}

#[derive(Default)]
struct RegistryState {
    fences: Vec<Weak<FenceState>>,
    lost: bool,
}

/// Every fence a queue may signal. When the queue stops, all of them are marked lost so
/// no waiter blocks on a signal that will never come.
#[derive(Clone, Default)]
pub(crate) struct FenceRegistry {
    state: Arc<Mutex<RegistryState>>,
}

impl FenceRegistry {
    pub fn register(&self, fence: &Arc<FenceState>) {
        let mut state = self.state.lock();
        if state.lost {
            fence.mark_lost();
            return;
        }
        state.fences.retain(|fence| fence.strong_count() > 0);
        state.fences.push(Arc::downgrade(fence));
    }

    pub fn mark_lost(&self) {
        let mut state = self.state.lock();
        state.lost = true;
        for fence in state.fences.drain(..).filter_map(|fence| fence.upgrade()) {
            fence.mark_lost();
        }
    }
}

#[derive(Debug)]
pub struct SoftFence {
    state: Arc<FenceState>,
}

impl SoftFence {
    pub(crate) fn new(initial_value: u64) -> Self {
        Self { state: Arc::new(FenceState::new(initial_value)) }
    }

    pub(crate) fn state(&self) -> &Arc<FenceState> { &self.state }
}

impl Fence for SoftFence {
    fn completed_value(&self) -> u64 {
        self.state.completed()
    }

    fn signal(&self, value: u64) {
        self.state.signal(value);
    }

    #[profiling::function]
    fn wait(&self, value: u64) -> RhiResult<()> {
        self.state.wait(value)
    }

    fn as_any(&self) -> &dyn Any { self }
}
