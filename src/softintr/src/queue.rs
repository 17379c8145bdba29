//! Per-level pending queues
use alloc::{collections::VecDeque, sync::Arc};
use core::sync::atomic::{AtomicU8, Ordering};
use spin::Mutex as SpinMutex;

use crate::{
    cpu::CpuId,
    handle::{EntryState, HandleEntry},
    ipl::Ipl,
    level::{Level, LevelSet},
};

/// The FIFO of pending handles for one level on one CPU.
///
/// Every method must be called with local interrupts disabled on the owning
/// CPU (see [`crate::IntrGuard`]). The lock is held only across the link or
/// unlink step, never across a handler invocation.
#[derive(Debug)]
pub(crate) struct SoftIntrQueue {
    cpu: CpuId,
    level: Level,
    entries: SpinMutex<VecDeque<Arc<HandleEntry>>>,
}

/// The result of [`SoftIntrQueue::enqueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Enqueue {
    /// The handle was linked.
    Linked,
    /// The handle was already pending somewhere.
    AlreadyPending,
    /// The handle has been disestablished.
    Dead,
}

impl SoftIntrQueue {
    pub(crate) fn new(cpu: CpuId, level: Level) -> Self {
        Self {
            cpu,
            level,
            entries: SpinMutex::new(VecDeque::new()),
        }
    }

    /// Get the IPL this queue's handlers run at.
    #[inline]
    pub(crate) fn ipl(&self) -> Ipl {
        self.level.ipl()
    }

    /// Link `entry` at the tail and set this level's bit in `pending`, unless
    /// `entry` is already pending.
    pub(crate) fn enqueue(&self, entry: &Arc<HandleEntry>, pending: &AtomicU8) -> Enqueue {
        debug_assert_eq!(entry.level, self.level);
        let mut entries = self.entries.lock();
        if entry.try_mark_queued(self.cpu) {
            entries.push_back(Arc::clone(entry));
            pending.fetch_or(self.level.bit().bits(), Ordering::AcqRel);
            Enqueue::Linked
        } else {
            match entry.state() {
                EntryState::Dead => Enqueue::Dead,
                _ => Enqueue::AlreadyPending,
            }
        }
    }

    /// Unlink the head entry and mark it not pending. Clears this level's bit
    /// in `pending` when the queue is left empty.
    pub(crate) fn dequeue(&self, pending: &AtomicU8) -> Option<Arc<HandleEntry>> {
        let mut entries = self.entries.lock();
        let entry = entries.pop_front();
        if let Some(entry) = &entry {
            entry.mark_unqueued();
        }
        if entries.is_empty() {
            pending.fetch_and(!self.level.bit().bits(), Ordering::AcqRel);
        }
        entry
    }

    /// Unlink `entry` and mark it dead if it's currently linked into this
    /// queue. Returns `false` if it isn't (anymore), in which case the caller
    /// should re-examine the entry's state.
    pub(crate) fn remove_and_kill(&self, entry: &Arc<HandleEntry>, pending: &AtomicU8) -> bool {
        let mut entries = self.entries.lock();
        if entry.state() != EntryState::Queued(self.cpu) {
            return false;
        }

        let Some(i) = entries.iter().position(|e| Arc::ptr_eq(e, entry)) else {
            unreachable!("{entry:?} is marked as queued on {:?} but isn't linked", self.cpu);
        };
        entries.remove(i);
        entry.mark_dead_from_queued();

        if entries.is_empty() {
            pending.fetch_and(!self.level.bit().bits(), Ordering::AcqRel);
        }
        true
    }

    /// Get the number of linked handles.
    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

/// Load a pending mask.
#[inline]
pub(crate) fn load_pending(pending: &AtomicU8) -> LevelSet {
    LevelSet::from_bits_truncate(pending.load(Ordering::Acquire))
}
