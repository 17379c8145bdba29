//! Software interrupt handles
use alloc::{boxed::Box, sync::Arc};
use core::{
    fmt,
    sync::atomic::{AtomicUsize, Ordering},
};

use crate::{cpu::CpuId, level::Level};

/// A deferred-work callback.
///
/// Implemented for every `Fn() + Send + Sync + 'static`, so a closure
/// capturing its argument is the usual way to supply one.
pub trait SoftIntrHandler: Send + Sync + 'static {
    /// Run the deferred work. Called with the CPU at the handle's level.
    /// Must not block.
    fn invoke(&self);
}

impl<F: Fn() + Send + Sync + 'static> SoftIntrHandler for F {
    #[inline]
    fn invoke(&self) {
        self()
    }
}

/// The handle is neither queued nor dead.
const STATE_IDLE: usize = 0;
/// The handle has been disestablished.
const STATE_DEAD: usize = usize::MAX;

/// The shared part of a handle. Queues hold references to it.
pub(crate) struct HandleEntry {
    /// The slot in the handle table.
    pub(crate) key: usize,
    pub(crate) level: Level,
    handler: Box<dyn SoftIntrHandler>,
    /// `STATE_IDLE`, `STATE_DEAD`, or `cpu + 1` if the handle is linked into
    /// that CPU's queue for `level`.
    ///
    /// Transitions into and out of the queued state only happen while the
    /// corresponding queue lock is held, which keeps "pending" and "linked"
    /// in agreement.
    state: AtomicUsize,
}

/// The result of [`HandleEntry::state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryState {
    Idle,
    Queued(CpuId),
    Dead,
}

impl HandleEntry {
    pub(crate) fn new(key: usize, level: Level, handler: Box<dyn SoftIntrHandler>) -> Self {
        Self {
            key,
            level,
            handler,
            state: AtomicUsize::new(STATE_IDLE),
        }
    }

    pub(crate) fn state(&self) -> EntryState {
        match self.state.load(Ordering::Acquire) {
            STATE_IDLE => EntryState::Idle,
            STATE_DEAD => EntryState::Dead,
            x => EntryState::Queued(CpuId(x - 1)),
        }
    }

    /// Transition `Idle` → `Queued(cpu)`. The caller must hold `cpu`'s queue
    /// lock for `self.level`.
    pub(crate) fn try_mark_queued(&self, cpu: CpuId) -> bool {
        self.state
            .compare_exchange(
                STATE_IDLE,
                cpu.0 + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Transition `Queued(_)` → `Idle`. The caller must hold the queue lock
    /// and have just unlinked `self`.
    pub(crate) fn mark_unqueued(&self) {
        debug_assert!(matches!(self.state(), EntryState::Queued(_)));
        self.state.store(STATE_IDLE, Ordering::Release);
    }

    /// Transition `Queued(_)` → `Dead`. The caller must hold the queue lock
    /// and have just unlinked `self`.
    pub(crate) fn mark_dead_from_queued(&self) {
        debug_assert!(matches!(self.state(), EntryState::Queued(_)));
        self.state.store(STATE_DEAD, Ordering::Release);
    }

    /// Transition `Idle` → `Dead`.
    pub(crate) fn try_mark_dead_from_idle(&self) -> bool {
        self.state
            .compare_exchange(STATE_IDLE, STATE_DEAD, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    #[inline]
    pub(crate) fn invoke(&self) {
        self.handler.invoke();
    }
}

impl fmt::Debug for HandleEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("HandleEntry")
            .field("key", &self.key)
            .field("level", &self.level)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// A registered software interrupt handler.
///
/// Obtained from [`SoftIntr::establish`](crate::SoftIntr::establish).
/// Cloning a handle does not register anything new: all clones refer to the
/// same registration, and [`SoftIntr::disestablish`](crate::SoftIntr::disestablish)
/// through any of them retires all of them.
#[derive(Clone)]
pub struct SoftIntrHandle {
    pub(crate) entry: Arc<HandleEntry>,
}

impl SoftIntrHandle {
    /// Get the level the handle was established at.
    #[inline]
    pub fn level(&self) -> Level {
        self.entry.level
    }

    /// Get the handle's slot number in the handle table. Unique among live
    /// handles; reused after `disestablish`.
    #[inline]
    pub fn id(&self) -> usize {
        self.entry.key
    }

    /// Return `true` if the handle is linked into a queue, waiting for
    /// dispatch.
    pub fn is_pending(&self) -> bool {
        matches!(self.entry.state(), EntryState::Queued(_))
    }

    /// Get the CPU whose queue the handle is currently linked into.
    pub fn pending_cpu(&self) -> Option<CpuId> {
        match self.entry.state() {
            EntryState::Queued(cpu) => Some(cpu),
            _ => None,
        }
    }

    /// Return `true` if the handle has been disestablished.
    pub fn is_disestablished(&self) -> bool {
        self.entry.state() == EntryState::Dead
    }

    /// Return `true` if `self` and `other` refer to the same registration.
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.entry, &other.entry)
    }
}

impl fmt::Debug for SoftIntrHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("SoftIntrHandle").field(&*self.entry).finish()
    }
}
