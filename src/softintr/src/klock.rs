//! Local interrupt disabling
use core::{fmt, marker::PhantomData};

use crate::Port;

/// RAII guard for a section running with interrupts disabled on the current
/// CPU.
///
/// Guards nest: dropping one restores exactly the state that was in effect
/// when it was created. The guard can't be sent to another thread because
/// the state it restores belongs to the CPU that created it.
pub struct IntrGuard<'a, P: Port> {
    port: &'a P,
    was_enabled: bool,
    _not_send: PhantomData<*const ()>,
}

impl<'a, P: Port> IntrGuard<'a, P> {
    /// Disable interrupts on the current CPU.
    #[inline]
    pub fn new(port: &'a P) -> Self {
        Self {
            port,
            was_enabled: port.disable_interrupts(),
            _not_send: PhantomData,
        }
    }

    /// Return `true` if interrupts were enabled when the guard was created.
    #[inline]
    pub fn was_enabled(&self) -> bool {
        self.was_enabled
    }
}

impl<P: Port> Drop for IntrGuard<'_, P> {
    #[inline]
    fn drop(&mut self) {
        self.port.restore_interrupts(self.was_enabled);
    }
}

impl<P: Port> fmt::Debug for IntrGuard<'_, P> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("IntrGuard")
            .field("was_enabled", &self.was_enabled)
            .finish()
    }
}
