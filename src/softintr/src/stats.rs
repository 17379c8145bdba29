//! Dispatch statistics
use alloc::vec::Vec;
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::{
    cpu::CpuId,
    level::{Level, NUM_LEVELS},
};

/// Event counters for one level on one CPU.
#[derive(Debug, Default)]
pub(crate) struct LevelCounters {
    scheduled: AtomicUsize,
    coalesced: AtomicUsize,
    dispatched: AtomicUsize,
}

impl LevelCounters {
    #[inline]
    pub(crate) fn count_scheduled(&self) {
        self.scheduled.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn count_coalesced(&self) {
        self.coalesced.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn count_dispatched(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> LevelStats {
        LevelStats {
            scheduled: self.scheduled.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
        }
    }
}

/// A snapshot of one level's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LevelStats {
    /// `schedule` calls that linked the handle.
    pub scheduled: usize,
    /// `schedule` calls that found the handle already pending.
    pub coalesced: usize,
    /// Handler invocations.
    pub dispatched: usize,
}

impl core::ops::AddAssign for LevelStats {
    fn add_assign(&mut self, rhs: Self) {
        self.scheduled += rhs.scheduled;
        self.coalesced += rhs.coalesced;
        self.dispatched += rhs.dispatched;
    }
}

/// A snapshot of one CPU's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuStats {
    pub cpu: CpuId,
    levels: [LevelStats; NUM_LEVELS],
}

impl CpuStats {
    pub(crate) fn new(cpu: CpuId, levels: [LevelStats; NUM_LEVELS]) -> Self {
        Self { cpu, levels }
    }

    #[inline]
    pub fn level(&self, level: Level) -> LevelStats {
        self.levels[level.index()]
    }
}

/// A snapshot of every counter, returned by
/// [`SoftIntr::stats`](crate::SoftIntr::stats).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stats {
    /// The number of live handles.
    pub established: usize,
    pub cpus: Vec<CpuStats>,
}

impl Stats {
    /// Sum `level`'s counters across all CPUs.
    pub fn level(&self, level: Level) -> LevelStats {
        let mut total = LevelStats::default();
        for cpu in &self.cpus {
            total += cpu.level(level);
        }
        total
    }

    /// The total number of handler invocations (the `softs` counter).
    pub fn softs(&self) -> usize {
        Level::ALL
            .into_iter()
            .map(|level| self.level(level).dispatched)
            .sum()
    }
}
