//! Per-phase coordination of multi-threaded command recording.

use parking_lot::Mutex;
use lumen_core::log;
use crate::command::CommandListStatus;
use crate::pool::{CommandListHandle, CommandListPool};

/// Maps worker indices to lazily acquired command lists for one parallel recording phase.
///
/// Recording order between workers is unconstrained; submission order is the worker
/// index order. The context is single-use: [`release`](Self::release) consumes it, and
/// dropping it returns any lists still held to the pool.
pub struct ParallelCommandContext<'a> {
    pool: &'a CommandListPool,
    slots: Mutex<Vec<Option<CommandListHandle>>>,
}

impl<'a> ParallelCommandContext<'a> {
    pub fn new(pool: &'a CommandListPool) -> Self {
        Self {
            pool,
            slots: Mutex::new(Vec::new()),
        }
    }

    /// Get the list for worker `index`, acquiring it and calling `begin` on first access.
    ///
    /// Returns `None` when the pool is exhausted; the worker has to fall back, for example
    /// by skipping its work or recording into another worker's list.
    pub fn get_command_list(&self, index: usize) -> Option<CommandListHandle> {
        let mut slots = self.slots.lock();
        if slots.len() <= index {
            slots.resize(index + 1, None);
        }

        if let Some(handle) = &slots[index] {
            return Some(handle.clone());
        }

        let handle = self.pool.acquire()?;
        handle.lock().begin();
        slots[index] = Some(handle.clone());
        Some(handle)
    }

    /// Number of slots, populated or not. At least `max(index) + 1` of every
    /// `get_command_list` call made so far.
    pub fn slot_count(&self) -> usize {
        self.slots.lock().len()
    }

    /// Number of slots holding a list.
    pub fn populated_count(&self) -> usize {
        self.slots.lock().iter().flatten().count()
    }

    /// End every populated list, in increasing index order.
    pub fn finalize(&mut self) {
        for handle in self.slots.get_mut().iter().flatten() {
            let mut list = handle.lock();
            if list.status() == CommandListStatus::Recording {
                list.end();
            } else {
                debug_assert_ne!(list.status(), CommandListStatus::Initial, "slot holds a list that was never begun");
            }
        }
    }

    /// Populated lists in increasing index order: the order they must be submitted in.
    pub fn command_lists(&self) -> Vec<CommandListHandle> {
        self.slots.lock().iter().flatten().cloned().collect()
    }

    /// Return every list to the pool. The context holds nothing afterwards.
    pub fn release(mut self) {
        self.release_slots();
    }

    fn release_slots(&mut self) {
        let slots = std::mem::take(self.slots.get_mut());
        if slots.is_empty() {
            return;
        }

        let mut released = 0usize;
        for handle in slots.into_iter().flatten() {
            self.pool.release(handle);
            released += 1;
        }
        log::trace!("Parallel context released {} command lists", released);
    }
}

impl Drop for ParallelCommandContext<'_> {
    fn drop(&mut self) {
        self.release_slots();
    }
}
