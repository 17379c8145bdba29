//! The dispatch loop
use crate::{
    cpu::{CpuId, DispatchState, PerCpuState},
    ipl::Ipl,
    klock::IntrGuard,
    level::LevelSet,
    system::SoftIntr,
    Port,
};

impl<P: Port> SoftIntr<P> {
    /// Run every pending handler the calling CPU's current IPL admits.
    ///
    /// This is what a port's dispatch self-interrupt should call. Lowering
    /// the IPL does the same thing implicitly.
    pub fn dispatch_pending(&self) {
        let cpu = self.current();
        self.dispatch_loop(cpu, cpu.cpl());
    }

    /// Get the levels with handles waiting on `cpu`.
    #[inline]
    pub fn pending(&self, cpu: CpuId) -> LevelSet {
        self.cpu(cpu).pending()
    }

    /// Get what `cpu`'s dispatch loop is doing.
    #[inline]
    pub fn dispatch_state(&self, cpu: CpuId) -> DispatchState {
        self.cpu(cpu).dispatch_state()
    }

    /// Get how many dispatch loops are active on `cpu`. A handler that lowers
    /// the IPL to let higher levels in starts a nested one.
    #[inline]
    pub fn dispatch_depth(&self, cpu: CpuId) -> usize {
        self.cpu(cpu).depth()
    }

    /// Drain `cpu`'s pending handles whose levels `target` admits.
    ///
    /// Each pass takes a single handle from the highest admitted level that
    /// has any, so a handler that schedules a higher level gets overtaken as
    /// soon as it returns. Handlers run at their level's IPL, which masks
    /// their own level. A loop started from inside a handler never goes
    /// below that handler's level, even if the handler lowered the IPL, so a
    /// handler can't overlap itself.
    pub(crate) fn dispatch_loop(&self, cpu: &PerCpuState, target: Ipl) {
        let admitted = self.masks.admitted(target.max(cpu.handler_floor()));
        cpu.enter_loop();

        loop {
            let Some(level) = (cpu.pending() & admitted).highest() else {
                break;
            };

            let queue = cpu.queue(level);
            let entry = {
                let _intr = IntrGuard::new(&self.port);
                queue.dequeue(cpu.pending_word())
            };
            let Some(entry) = entry else {
                // Drained by a nested loop or by `disestablish`. `dequeue`
                // has cleared the bit.
                continue;
            };

            let saved = cpu.cpl();
            self.set_cpl(cpu, queue.ipl());
            let prev_state = cpu.enter_handler(level);

            log::trace!("{:?}: dispatching {entry:?}", cpu.id);
            entry.invoke();

            cpu.leave_handler(prev_state);
            cpu.counters(level).count_dispatched();
            self.set_cpl(cpu, saved);
        }

        cpu.leave_loop();
        if cpu.depth() == 0 {
            debug_assert_eq!(cpu.dispatch_state(), DispatchState::Idle);
        }
    }
}
