//! Interrupt priority levels
use core::fmt;

/// The number of distinct interrupt priority levels. Valid values are
/// `0..NIPL`.
pub const NIPL: usize = 16;

/// An interrupt priority level (IPL).
///
/// A CPU running at IPL `x` defers every interrupt source, hardware or
/// software, whose IPL is less than or equal to `x`. Every software interrupt
/// level sits below every hardware level, so soft interrupts never preempt
/// hardware handlers.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Ipl(u8);

impl Ipl {
    /// Nothing is masked.
    pub const NONE: Self = Self(0);
    /// Generic software interrupts.
    pub const SOFT: Self = Self(1);
    /// Software terminal interrupts.
    pub const SOFTTTY: Self = Self(2);
    /// Software network interrupts.
    pub const SOFTNET: Self = Self(3);
    /// Software clock interrupts (timeouts).
    pub const SOFTCLOCK: Self = Self(4);
    /// Block I/O devices.
    pub const BIO: Self = Self(5);
    /// Network interfaces.
    pub const NET: Self = Self(6);
    /// Terminal devices.
    pub const TTY: Self = Self(7);
    /// Memory allocation.
    pub const VM: Self = Self(8);
    /// Audio devices.
    pub const AUDIO: Self = Self(9);
    /// Hardware clock.
    pub const CLOCK: Self = Self(10);
    /// Statistics clock.
    pub const STATCLOCK: Self = Self(11);
    /// Everything the scheduler touches.
    pub const SCHED: Self = Self(12);
    /// Everything.
    pub const HIGH: Self = Self(13);
    /// Inter-processor interrupts.
    pub const IPI: Self = Self(14);

    /// The highest representable level.
    pub const MAX: Self = Self(NIPL as u8 - 1);

    /// Construct an `Ipl`, returning `None` if `x` is out of range.
    #[inline]
    pub const fn new(x: u8) -> Option<Self> {
        if (x as usize) < NIPL {
            Some(Self(x))
        } else {
            None
        }
    }

    /// Get the raw value.
    #[inline]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Get the raw value as an index into per-IPL tables.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Return `true` if this is one of the software interrupt levels.
    #[inline]
    pub const fn is_soft(self) -> bool {
        self.0 >= Self::SOFT.0 && self.0 <= Self::SOFTCLOCK.0
    }

    /// Iterate over every valid level in ascending order.
    pub fn all() -> impl Iterator<Item = Self> + Clone {
        (0..NIPL as u8).map(Self)
    }

    fn name(self) -> Option<&'static str> {
        Some(match self {
            Self::NONE => "none",
            Self::SOFT => "soft",
            Self::SOFTTTY => "softtty",
            Self::SOFTNET => "softnet",
            Self::SOFTCLOCK => "softclock",
            Self::BIO => "bio",
            Self::NET => "net",
            Self::TTY => "tty",
            Self::VM => "vm",
            Self::AUDIO => "audio",
            Self::CLOCK => "clock",
            Self::STATCLOCK => "statclock",
            Self::SCHED => "sched",
            Self::HIGH => "high",
            Self::IPI => "ipi",
            _ => return None,
        })
    }
}

impl fmt::Debug for Ipl {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "Ipl({}:{name})", self.0),
            None => write!(f, "Ipl({})", self.0),
        }
    }
}

impl fmt::Display for Ipl {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<Ipl> for u8 {
    #[inline]
    fn from(x: Ipl) -> Self {
        x.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn soft_levels_below_hardware() {
        let soft: Vec<Ipl> = Ipl::all().filter(|ipl| ipl.is_soft()).collect();
        assert_eq!(
            soft,
            [Ipl::SOFT, Ipl::SOFTTTY, Ipl::SOFTNET, Ipl::SOFTCLOCK]
        );
        for ipl in Ipl::all().filter(|ipl| *ipl > Ipl::SOFTCLOCK) {
            assert!(!ipl.is_soft());
        }
        assert!(!Ipl::NONE.is_soft());
    }

    #[test]
    fn range() {
        assert_eq!(Ipl::new(15), Some(Ipl::MAX));
        assert_eq!(Ipl::new(16), None);
        assert_eq!(Ipl::all().count(), NIPL);
    }

    #[test]
    fn debug_names() {
        assert_eq!(format!("{:?}", Ipl::SOFTNET), "Ipl(3:softnet)");
        assert_eq!(format!("{:?}", Ipl::MAX), "Ipl(15)");
        assert_eq!(Ipl::HIGH.to_string(), "13");
    }
}
