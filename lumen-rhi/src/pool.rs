//! Thread-safe command list pool.
//!
//! The pool owns every list it ever allocated and partitions them into a free set and an
//! acquired set. `acquire`/`release` may be called from any number of threads; `reset` is
//! a single-threaded checkpoint, valid only when nothing is acquired and the GPU is done
//! with every list's previous contents.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use parking_lot::{Mutex, MutexGuard};
use lumen_core::collections::hashmap::HashMap;
use lumen_core::log;
use crate::command::{CommandList, CommandListId, CommandListKind, CommandListStatus};
use crate::error::{RhiError, RhiResult};

/// Shared handle to a command list.
///
/// The lock enforces the single-writer rule: a recorder holds the guard while recording.
#[derive(Clone)]
pub struct CommandListHandle {
    id: CommandListId,
    list: Arc<Mutex<Box<dyn CommandList>>>,
}

impl CommandListHandle {
    pub fn new(list: Box<dyn CommandList>) -> Self {
        Self { id: list.id(), list: Arc::new(Mutex::new(list)) }
    }

    #[inline]
    pub fn id(&self) -> CommandListId { self.id }

    /// Lock the list for recording.
    #[inline]
    pub fn lock(&self) -> MutexGuard<'_, Box<dyn CommandList>> {
        self.list.lock()
    }

    /// Whether both handles refer to the same list.
    #[inline]
    pub fn ptr_eq(&self, other: &CommandListHandle) -> bool {
        Arc::ptr_eq(&self.list, &other.list)
    }
}

impl std::fmt::Debug for CommandListHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandListHandle").field("id", &self.id).finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandListPoolDesc {
    pub debug_name: String,
    pub kind: CommandListKind,
    /// Lists allocated up front.
    pub initial_pool_size: usize,
    /// Hard cap; `acquire` returns `None` once this many lists are out.
    pub max_pool_size: usize,
}

impl Default for CommandListPoolDesc {
    fn default() -> Self {
        Self {
            debug_name: "command_list_pool".to_string(),
            kind: CommandListKind::Graphics,
            initial_pool_size: 4,
            max_pool_size: 16,
        }
    }
}

impl CommandListPoolDesc {
    pub fn new(name: &str, initial_pool_size: usize, max_pool_size: usize) -> Self {
        Self {
            debug_name: name.to_owned(),
            initial_pool_size,
            max_pool_size,
            ..Default::default()
        }
    }

    pub fn with_kind(mut self, kind: CommandListKind) -> Self {
        self.kind = kind;
        self
    }

    pub(crate) fn validate(&self) -> RhiResult<()> {
        if self.max_pool_size == 0 {
            return Err(RhiError::invalid_descriptor(format!("pool `{}` has zero capacity", self.debug_name)));
        }
        if self.initial_pool_size > self.max_pool_size {
            return Err(RhiError::invalid_descriptor(format!(
                "pool `{}`: initial size {} exceeds max size {}",
                self.debug_name, self.initial_pool_size, self.max_pool_size
            )));
        }
        Ok(())
    }
}

/// Backend hook that creates a fresh command list for the pool.
pub type CommandListAllocator = Box<dyn Fn() -> RhiResult<Box<dyn CommandList>> + Send + Sync>;

struct PoolEntry {
    handle: CommandListHandle,
    acquired: bool,
}

#[derive(Default)]
struct PoolState {
    entries: Vec<PoolEntry>,
    /// Indices into `entries`, used as a stack so recently released lists are reused first.
    free: Vec<usize>,
    lookup: HashMap<CommandListId, usize>,
}

pub struct CommandListPool {
    desc: CommandListPoolDesc,
    allocator: CommandListAllocator,
    state: Mutex<PoolState>,
    acquired_count: AtomicUsize,
    total_count: AtomicUsize,
}

impl CommandListPool {
    pub fn new(desc: &CommandListPoolDesc, allocator: CommandListAllocator) -> RhiResult<Self> {
        desc.validate()?;

        let pool = Self {
            desc: desc.clone(),
            allocator,
            state: Mutex::new(PoolState::default()),
            acquired_count: AtomicUsize::new(0),
            total_count: AtomicUsize::new(0),
        };

        {
            let mut guard = pool.state.lock();
            let state = &mut *guard;
            for _ in 0..desc.initial_pool_size {
                let index = pool.allocate(state)?;
                state.free.push(index);
            }
            // Hand out the first allocated list first.
            state.free.reverse();
        }

        log::debug!(
            "Created command list pool `{}` ({:?}, {}/{} lists)",
            desc.debug_name, desc.kind, desc.initial_pool_size, desc.max_pool_size
        );
        Ok(pool)
    }

    fn allocate(&self, state: &mut PoolState) -> RhiResult<usize> {
        let list = (self.allocator)()?;
        debug_assert_eq!(list.kind(), self.desc.kind, "allocator produced a list of the wrong kind");

        let handle = CommandListHandle::new(list);
        let index = state.entries.len();
        state.lookup.insert(handle.id(), index);
        state.entries.push(PoolEntry { handle, acquired: false });
        self.total_count.store(state.entries.len(), Ordering::Relaxed);
        Ok(index)
    }

    /// Take a list out of the free set, growing the pool up to its maximum size.
    ///
    /// Returns `None` when every list is acquired and the pool cannot grow. The list is
    /// returned in `Initial` state.
    pub fn acquire(&self) -> Option<CommandListHandle> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let index = match state.free.pop() {
            Some(index) => index,
            None if state.entries.len() < self.desc.max_pool_size => match self.allocate(state) {
                Ok(index) => {
                    log::debug!("Command list pool `{}` grew to {} lists", self.desc.debug_name, state.entries.len());
                    index
                }
                Err(err) => {
                    log::error!("Command list pool `{}` failed to allocate: {}", self.desc.debug_name, err);
                    return None;
                }
            },
            None => {
                log::debug!("Command list pool `{}` exhausted", self.desc.debug_name);
                return None;
            }
        };

        let entry = &mut state.entries[index];
        debug_assert!(!entry.acquired, "free list contains an acquired command list");
        entry.acquired = true;
        self.acquired_count.fetch_add(1, Ordering::Relaxed);

        {
            // Recycled lists come back closed or submitted; submitted content is owned by the queue.
            let mut list = entry.handle.lock();
            if list.status() != CommandListStatus::Initial {
                list.reset();
            }
        }

        Some(entry.handle.clone())
    }

    /// Return a list obtained from [`acquire`](Self::acquire) to the free set.
    pub fn release(&self, handle: CommandListHandle) {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let Some(&index) = state.lookup.get(&handle.id()) else {
            debug_assert!(false, "command list {:?} does not belong to pool `{}`", handle.id(), self.desc.debug_name);
            log::error!("Command list {:?} released to foreign pool `{}`", handle.id(), self.desc.debug_name);
            return;
        };

        let entry = &mut state.entries[index];
        if !entry.acquired {
            debug_assert!(false, "command list {:?} released twice", handle.id());
            log::error!("Command list {:?} released twice to pool `{}`", handle.id(), self.desc.debug_name);
            return;
        }

        entry.acquired = false;
        state.free.push(index);
        self.acquired_count.fetch_sub(1, Ordering::Relaxed);
    }

    /// Reset every list. Not thread-safe by contract: call it only when no list is
    /// acquired and the GPU has finished executing everything recorded into this pool.
    #[profiling::function]
    pub fn reset(&self) {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        debug_assert_eq!(
            self.acquired_count.load(Ordering::Relaxed),
            0,
            "command list pool `{}` reset while lists are acquired",
            self.desc.debug_name
        );

        for entry in &state.entries {
            entry.handle.lock().reset();
        }
    }

    /// Best-effort count of lists currently acquired.
    #[inline]
    pub fn acquired_count(&self) -> usize {
        self.acquired_count.load(Ordering::Relaxed)
    }

    /// Best-effort count of lists ever allocated.
    #[inline]
    pub fn total_count(&self) -> usize {
        self.total_count.load(Ordering::Relaxed)
    }

    pub fn free_count(&self) -> usize {
        self.state.lock().free.len()
    }

    #[inline]
    pub fn max_pool_size(&self) -> usize { self.desc.max_pool_size }

    #[inline]
    pub fn kind(&self) -> CommandListKind { self.desc.kind }

    #[inline]
    pub fn desc(&self) -> &CommandListPoolDesc { &self.desc }
}

impl std::fmt::Debug for CommandListPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandListPool")
            .field("name", &self.desc.debug_name)
            .field("acquired", &self.acquired_count())
            .field("total", &self.total_count())
            .field("max", &self.desc.max_pool_size)
            .finish()
    }
}
