//! Software interrupt levels
use core::fmt;

use crate::{error::InvalidLevelError, ipl::Ipl};

/// The number of software interrupt levels.
pub const NUM_LEVELS: usize = 4;

/// A software interrupt level.
///
/// The set is closed and totally ordered: `Clock > Network > Tty > Generic`.
/// The mask table and the dispatch order both depend on that, so there's no
/// way to add a level at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Level {
    Generic = 0,
    Tty = 1,
    Network = 2,
    Clock = 3,
}

impl Level {
    /// All levels, highest priority first.
    pub const ALL: [Self; NUM_LEVELS] = [Self::Clock, Self::Network, Self::Tty, Self::Generic];

    /// All levels in index order.
    pub(crate) const BY_INDEX: [Self; NUM_LEVELS] =
        [Self::Generic, Self::Tty, Self::Network, Self::Clock];

    /// Get the level's index into per-level tables.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Get the level whose index is `i`.
    #[inline]
    pub const fn from_index(i: usize) -> Option<Self> {
        match i {
            0 => Some(Self::Generic),
            1 => Some(Self::Tty),
            2 => Some(Self::Network),
            3 => Some(Self::Clock),
            _ => None,
        }
    }

    /// Get the interrupt priority level at which this level's handlers run.
    /// The level is masked whenever the current IPL is at or above this
    /// value.
    #[inline]
    pub const fn ipl(self) -> Ipl {
        match self {
            Self::Generic => Ipl::SOFT,
            Self::Tty => Ipl::SOFTTTY,
            Self::Network => Ipl::SOFTNET,
            Self::Clock => Ipl::SOFTCLOCK,
        }
    }

    /// Get the level bound to the soft IPL `ipl`.
    pub fn from_ipl(ipl: Ipl) -> Result<Self, InvalidLevelError> {
        Self::ALL
            .into_iter()
            .find(|level| level.ipl() == ipl)
            .ok_or(InvalidLevelError::BadIpl(ipl))
    }

    /// Get the pending mask bit of this level.
    #[inline]
    pub const fn bit(self) -> LevelSet {
        LevelSet::from_bits_retain(1 << self as u8)
    }
}

impl TryFrom<u8> for Level {
    type Error = InvalidLevelError;

    #[inline]
    fn try_from(x: u8) -> Result<Self, Self::Error> {
        Self::from_index(x as usize).ok_or(InvalidLevelError::BadIndex(x))
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::Generic => "soft",
            Self::Tty => "softtty",
            Self::Network => "softnet",
            Self::Clock => "softclock",
        })
    }
}

bitflags::bitflags! {
    /// A set of [`Level`]s. Used as the per-CPU pending mask and in the mask
    /// table.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct LevelSet: u8 {
        const GENERIC = 1 << Level::Generic as u8;
        const TTY = 1 << Level::Tty as u8;
        const NETWORK = 1 << Level::Network as u8;
        const CLOCK = 1 << Level::Clock as u8;
    }
}

impl LevelSet {
    /// Get the highest-priority level in the set.
    #[inline]
    pub fn highest(self) -> Option<Level> {
        if self.is_empty() {
            None
        } else {
            Level::from_index((u8::BITS - 1 - self.bits().leading_zeros()) as usize)
        }
    }

    /// Check whether `level` is in the set.
    #[inline]
    pub fn has(self, level: Level) -> bool {
        self.contains(level.bit())
    }

    /// Iterate over the levels in the set, highest priority first.
    pub fn levels(self) -> impl Iterator<Item = Level> {
        Level::ALL.into_iter().filter(move |level| self.has(*level))
    }
}

impl From<Level> for LevelSet {
    #[inline]
    fn from(x: Level) -> Self {
        x.bit()
    }
}

impl FromIterator<Level> for LevelSet {
    fn from_iter<I: IntoIterator<Item = Level>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::empty(), |set, level| set | level.bit())
    }
}
