//! Per-IPL software interrupt masks
use crate::{
    ipl::{Ipl, NIPL},
    level::{Level, LevelSet},
};

/// For every IPL, the set of software interrupt levels it masks.
///
/// Built once when [`SoftIntr`](crate::SoftIntr) is initialized and
/// read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskTable {
    masked: [LevelSet; NIPL],
}

impl MaskTable {
    pub fn new() -> Self {
        let mut masked = [LevelSet::empty(); NIPL];
        for ipl in Ipl::all() {
            masked[ipl.index()] = Level::ALL
                .into_iter()
                .filter(|level| level.ipl() <= ipl)
                .collect();
        }
        Self { masked }
    }

    /// Get the levels that must not run while the CPU is at `ipl`.
    #[inline]
    pub fn masked(&self, ipl: Ipl) -> LevelSet {
        self.masked[ipl.index()]
    }

    /// Get the levels that may run while the CPU is at `ipl`.
    #[inline]
    pub fn admitted(&self, ipl: Ipl) -> LevelSet {
        !self.masked(ipl)
    }
}

impl Default for MaskTable {
    fn default() -> Self {
        Self::new()
    }
}
