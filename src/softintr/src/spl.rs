//! The priority-level gate (`splraise`, `spllower`, `splx`, `splassert`)
use core::{fmt, marker::PhantomData, panic::Location};

use crate::{
    config::SplAssertPolicy,
    cpu::{CpuId, PerCpuState},
    ipl::Ipl,
    klock::IntrGuard,
    level::Level,
    system::SoftIntr,
    Port,
};

impl<P: Port> SoftIntr<P> {
    /// Get the calling CPU's current IPL.
    #[inline]
    pub fn current_ipl(&self) -> Ipl {
        self.current().cpl()
    }

    /// Get `cpu`'s current IPL.
    #[inline]
    pub fn ipl_of(&self, cpu: CpuId) -> Ipl {
        self.cpu(cpu).cpl()
    }

    /// Raise the calling CPU's IPL to `new` if it's currently lower. Returns
    /// the previous IPL, to be passed to [`Self::restore`] later.
    ///
    /// Never dispatches anything.
    pub fn raise(&self, new: Ipl) -> Ipl {
        let cpu = self.current();
        let old = cpu.cpl();
        if new > old {
            self.set_cpl(cpu, new);
        }
        log::trace!("{:?}: splraise({new:?}) = {old:?}", cpu.id);
        old
    }

    /// Raise the IPL and get an RAII guard that restores it on drop.
    pub fn raise_guard(&self, new: Ipl) -> SplGuard<'_, P> {
        SplGuard {
            system: self,
            saved: self.raise(new),
            _not_send: PhantomData,
        }
    }

    /// Lower the calling CPU's IPL to `new` if it's currently higher, first
    /// running every pending handler that `new` unmasks.
    pub fn lower(&self, new: Ipl) {
        let cpu = self.current();
        if new < cpu.cpl() {
            log::trace!("{:?}: spllower({new:?})", cpu.id);
            self.splx(cpu, new);
        }
    }

    /// Set the calling CPU's IPL to `saved` (a value returned by
    /// [`Self::raise`]). If that lowers the IPL, pending handlers that it
    /// unmasks run first.
    pub fn restore(&self, saved: Ipl) {
        let cpu = self.current();
        log::trace!("{:?}: splx({saved:?})", cpu.id);
        if saved < cpu.cpl() {
            self.splx(cpu, saved);
        } else {
            self.set_cpl(cpu, saved);
        }
    }

    /// Run `handler` as a hardware interrupt handler at `ipl` on the calling
    /// CPU, then return from the trap, dispatching whatever soft interrupts
    /// the handler scheduled.
    ///
    /// Returns `None` without calling `handler` if the CPU currently holds
    /// off `ipl`.
    pub fn hardware_interrupt<R>(&self, ipl: Ipl, handler: impl FnOnce() -> R) -> Option<R> {
        let cpu = self.current();
        let saved = cpu.cpl();
        if ipl <= saved {
            log::trace!("{:?}: interrupt at {ipl:?} held off at {saved:?}", cpu.id);
            return None;
        }

        self.set_cpl(cpu, ipl);
        let result = handler();

        // Return from the trap
        self.restore(saved);

        Some(result)
    }

    /// Check that the calling CPU's IPL is at least `want`. What happens
    /// otherwise is decided by [`Config::splassert`](crate::Config::splassert).
    ///
    /// This is a no-op unless the `diagnostic` feature is enabled.
    #[track_caller]
    pub fn assert_at_least(&self, want: Ipl) {
        if !cfg!(feature = "diagnostic") {
            return;
        }

        let policy = self.config().splassert;
        if policy == SplAssertPolicy::Disabled {
            return;
        }

        let have = self.current_ipl();
        if have >= want {
            return;
        }

        self.splassert_fail(want, have, Location::caller());
    }

    /// Check that the calling CPU's IPL masks `level`.
    #[track_caller]
    pub fn soft_assert_at_least(&self, level: Level) {
        self.assert_at_least(level.ipl());
    }

    #[cold]
    fn splassert_fail(&self, want: Ipl, have: Ipl, caller: &Location<'_>) {
        let cpu = self.port.current_cpu();
        match self.config().splassert {
            SplAssertPolicy::Disabled => {}
            SplAssertPolicy::Report => {
                log::error!("splassert: {caller}: {cpu:?}: want {want:?} have {have:?}");
            }
            SplAssertPolicy::Raise => {
                log::error!(
                    "splassert: {caller}: {cpu:?}: want {want:?} have {have:?}, raising"
                );
                self.raise(want);
            }
            SplAssertPolicy::Panic => {
                panic!("splassert: {caller}: {cpu:?}: want {want:?} have {have:?}");
            }
        }
    }

    /// Write `ipl` to the hardware and to the bookkeeping.
    #[inline]
    pub(crate) fn set_cpl(&self, cpu: &PerCpuState, ipl: Ipl) {
        self.port.set_hardware_priority(cpu.id, ipl);
        cpu.set_cpl(ipl);
    }

    /// Lower `cpu`'s IPL to `new`, draining what `new` unmasks first.
    ///
    /// The final check and the IPL write happen with interrupts disabled so
    /// that nothing scheduled in between is left stranded until the next
    /// lowering.
    ///
    /// Inside a handler, only levels above the handler's own are drained.
    /// The rest stay pending for the enclosing dispatch loop.
    fn splx(&self, cpu: &PerCpuState, new: Ipl) {
        let admitted = self.masks.admitted(new.max(cpu.handler_floor()));
        loop {
            let intr = IntrGuard::new(&self.port);
            if (cpu.pending() & admitted).is_empty() {
                self.set_cpl(cpu, new);
                return;
            }
            drop(intr);

            self.dispatch_loop(cpu, new);
        }
    }
}

/// RAII guard returned by [`SoftIntr::raise_guard`]. Restores the saved IPL
/// (dispatching as needed) when dropped.
///
/// Must be dropped on the CPU that created it.
#[must_use = "dropping the guard restores the IPL immediately"]
pub struct SplGuard<'a, P: Port> {
    system: &'a SoftIntr<P>,
    saved: Ipl,
    _not_send: PhantomData<*const ()>,
}

impl<P: Port> SplGuard<'_, P> {
    /// Get the IPL that will be restored.
    #[inline]
    pub fn saved(&self) -> Ipl {
        self.saved
    }
}

impl<P: Port> Drop for SplGuard<'_, P> {
    fn drop(&mut self) {
        self.system.restore(self.saved);
    }
}

impl<P: Port> fmt::Debug for SplGuard<'_, P> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SplGuard")
            .field("saved", &self.saved)
            .finish()
    }
}
