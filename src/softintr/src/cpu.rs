//! Per-CPU state
use core::{
    fmt,
    sync::atomic::{AtomicU8, AtomicUsize, Ordering},
};

use crate::{
    ipl::Ipl,
    level::{Level, LevelSet, NUM_LEVELS},
    queue::{self, SoftIntrQueue},
    stats::LevelCounters,
};

/// Identifies a CPU. Valid values are `0..Config::num_cpus`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct CpuId(pub usize);

impl fmt::Debug for CpuId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "cpu{}", self.0)
    }
}

impl fmt::Display for CpuId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// What the dispatch loop on a CPU is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    /// No handler is running.
    Idle,
    /// A handler of the given level is running.
    Dispatching(Level),
}

const DISPATCH_IDLE: u8 = u8::MAX;

impl DispatchState {
    fn encode(self) -> u8 {
        match self {
            Self::Idle => DISPATCH_IDLE,
            Self::Dispatching(level) => level as u8,
        }
    }

    fn decode(x: u8) -> Self {
        match Level::try_from(x) {
            Ok(level) => Self::Dispatching(level),
            Err(_) => Self::Idle,
        }
    }
}

/// The state one CPU owns: its current IPL, pending mask, and one queue per
/// level.
///
/// Apart from the queues (which have their own locks), the fields are only
/// written by the owning CPU, so plain atomic loads and stores suffice.
pub(crate) struct PerCpuState {
    pub(crate) id: CpuId,
    /// The current interrupt priority level.
    cpl: AtomicU8,
    /// Bit `i` is set iff `queues[i]` is non-empty.
    pending: AtomicU8,
    dispatch_state: AtomicU8,
    /// The dispatch loop nesting depth.
    depth: AtomicUsize,
    queues: [SoftIntrQueue; NUM_LEVELS],
    counters: [LevelCounters; NUM_LEVELS],
}

impl PerCpuState {
    pub(crate) fn new(id: CpuId) -> Self {
        Self {
            id,
            cpl: AtomicU8::new(Ipl::NONE.get()),
            pending: AtomicU8::new(0),
            dispatch_state: AtomicU8::new(DISPATCH_IDLE),
            depth: AtomicUsize::new(0),
            queues: Level::BY_INDEX.map(|level| SoftIntrQueue::new(id, level)),
            counters: Default::default(),
        }
    }

    #[inline]
    pub(crate) fn cpl(&self) -> Ipl {
        // `cpl` only ever holds values produced by `Ipl::get`
        Ipl::new(self.cpl.load(Ordering::Relaxed)).unwrap_or(Ipl::MAX)
    }

    #[inline]
    pub(crate) fn set_cpl(&self, ipl: Ipl) {
        self.cpl.store(ipl.get(), Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn pending(&self) -> LevelSet {
        queue::load_pending(&self.pending)
    }

    #[inline]
    pub(crate) fn pending_word(&self) -> &AtomicU8 {
        &self.pending
    }

    #[inline]
    pub(crate) fn queue(&self, level: Level) -> &SoftIntrQueue {
        &self.queues[level.index()]
    }

    #[inline]
    pub(crate) fn counters(&self, level: Level) -> &LevelCounters {
        &self.counters[level.index()]
    }

    pub(crate) fn dispatch_state(&self) -> DispatchState {
        DispatchState::decode(self.dispatch_state.load(Ordering::Relaxed))
    }

    /// Record that a handler of `level` is about to run. Returns the state to
    /// pass to [`Self::leave_handler`].
    pub(crate) fn enter_handler(&self, level: Level) -> DispatchState {
        DispatchState::decode(
            self.dispatch_state
                .swap(DispatchState::Dispatching(level).encode(), Ordering::Relaxed),
        )
    }

    /// Get the IPL below which nothing may be dispatched: the level of the
    /// innermost running handler, or [`Ipl::NONE`] outside handlers.
    ///
    /// A handler that lowers the IPL below its own level must not see its
    /// own level (or a lower one) dispatched underneath it.
    pub(crate) fn handler_floor(&self) -> Ipl {
        match self.dispatch_state() {
            DispatchState::Idle => Ipl::NONE,
            DispatchState::Dispatching(level) => level.ipl(),
        }
    }

    pub(crate) fn leave_handler(&self, prev: DispatchState) {
        self.dispatch_state.store(prev.encode(), Ordering::Relaxed);
    }

    /// Get the dispatch loop nesting depth.
    pub(crate) fn depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    pub(crate) fn enter_loop(&self) {
        self.depth.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn leave_loop(&self) {
        self.depth.fetch_sub(1, Ordering::Relaxed);
    }
}

impl fmt::Debug for PerCpuState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("PerCpuState")
            .field("id", &self.id)
            .field("cpl", &self.cpl())
            .field("pending", &self.pending())
            .field("dispatch_state", &self.dispatch_state())
            .field(
                "queue_lens",
                &Level::ALL.map(|level| (level, self.queue(level).len())),
            )
            .finish()
    }
}
