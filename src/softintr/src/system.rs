//! Handle registration and scheduling
use alloc::{boxed::Box, sync::Arc, vec::Vec};
use slab::Slab;
use spin::Mutex as SpinMutex;

use crate::{
    config::Config,
    cpu::{CpuId, PerCpuState},
    error::{ConfigError, EstablishError},
    handle::{EntryState, HandleEntry, SoftIntrHandle, SoftIntrHandler},
    ipl::Ipl,
    klock::IntrGuard,
    level::Level,
    mask::MaskTable,
    queue::Enqueue,
    stats::{CpuStats, Stats},
    Port,
};

/// The software interrupt system: every CPU's priority state and queues, the
/// mask table, and the handle table.
///
/// See the [crate-level documentation](crate) for an overview.
pub struct SoftIntr<P: Port> {
    pub(crate) port: P,
    config: Config,
    pub(crate) masks: MaskTable,
    cpus: Box<[PerCpuState]>,
    /// Live handles. The capacity limit is `config.max_handles`.
    handles: SpinMutex<Slab<Arc<HandleEntry>>>,
}

impl<P: Port> SoftIntr<P> {
    /// Initialize the system: build the mask table and allocate each CPU's
    /// queues. Every CPU starts at [`Ipl::NONE`] with nothing pending.
    ///
    /// Must be called before any interrupt that might use it is enabled.
    pub fn new(config: Config, port: P) -> Result<Self, ConfigError> {
        config.validate()?;
        log::debug!("softintr_init: {config:?}");

        let cpus: Box<[PerCpuState]> = (0..config.num_cpus)
            .map(|i| PerCpuState::new(CpuId(i)))
            .collect();

        Ok(Self {
            port,
            masks: MaskTable::new(),
            cpus,
            handles: SpinMutex::new(Slab::with_capacity(config.max_handles)),
            config,
        })
    }

    #[inline]
    pub fn port(&self) -> &P {
        &self.port
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn mask_table(&self) -> &MaskTable {
        &self.masks
    }

    #[inline]
    pub fn num_cpus(&self) -> usize {
        self.cpus.len()
    }

    /// Get `cpu`'s state.
    ///
    /// # Panics
    ///
    /// Panics if `cpu` is out of range. That means the port handed out a CPU
    /// number it didn't configure.
    pub(crate) fn cpu(&self, cpu: CpuId) -> &PerCpuState {
        match self.cpus.get(cpu.0) {
            Some(state) => state,
            None => panic!("{cpu:?} is out of range (num_cpus = {})", self.cpus.len()),
        }
    }

    /// Get the calling CPU's state.
    #[inline]
    pub(crate) fn current(&self) -> &PerCpuState {
        self.cpu(self.port.current_cpu())
    }

    /// Register `handler` at `level`.
    ///
    /// The new handle isn't pending. Fails with
    /// [`EstablishError::OutOfMemory`] when the handle table is full, in which
    /// case the caller should carry on without the deferred work.
    pub fn establish(
        &self,
        level: Level,
        handler: impl SoftIntrHandler,
    ) -> Result<SoftIntrHandle, EstablishError> {
        self.establish_boxed(level, Box::new(handler))
    }

    /// Register a function pointer and an opaque argument at `level`.
    pub fn establish_fn(
        &self,
        level: Level,
        func: fn(usize),
        arg: usize,
    ) -> Result<SoftIntrHandle, EstablishError> {
        self.establish(level, move || func(arg))
    }

    /// Register `handler` at the level bound to the soft IPL `ipl`.
    ///
    /// # Panics
    ///
    /// Panics if `ipl` isn't one of [`Ipl::SOFT`], [`Ipl::SOFTTTY`],
    /// [`Ipl::SOFTNET`], or [`Ipl::SOFTCLOCK`].
    #[track_caller]
    pub fn establish_ipl(
        &self,
        ipl: Ipl,
        handler: impl SoftIntrHandler,
    ) -> Result<SoftIntrHandle, EstablishError> {
        match Level::from_ipl(ipl) {
            Ok(level) => self.establish(level, handler),
            Err(e) => panic!("softintr_establish: {e}"),
        }
    }

    fn establish_boxed(
        &self,
        level: Level,
        handler: Box<dyn SoftIntrHandler>,
    ) -> Result<SoftIntrHandle, EstablishError> {
        let _intr = IntrGuard::new(&self.port);
        let mut handles = self.handles.lock();

        if handles.len() >= self.config.max_handles {
            log::warn!(
                "softintr_establish: no storage for a {level} handler ({} in use)",
                handles.len()
            );
            return Err(EstablishError::OutOfMemory);
        }

        let slot = handles.vacant_entry();
        let entry = Arc::new(HandleEntry::new(slot.key(), level, handler));
        slot.insert(Arc::clone(&entry));
        log::debug!("softintr_establish: {entry:?}");

        Ok(SoftIntrHandle { entry })
    }

    /// Retire `handle`. If it's pending, it's unlinked first and its handler
    /// won't run.
    ///
    /// All clones of `handle` are retired too; scheduling them afterwards
    /// does nothing. Calling this while the handler is running on another
    /// CPU is the caller's responsibility to avoid.
    pub fn disestablish(&self, handle: SoftIntrHandle) {
        let entry = &handle.entry;

        loop {
            match entry.state() {
                EntryState::Dead => {
                    log::warn!("softintr_disestablish: {entry:?} is already gone");
                    return;
                }
                EntryState::Idle => {
                    if entry.try_mark_dead_from_idle() {
                        break;
                    }
                }
                EntryState::Queued(cpu) => {
                    let cpu = self.cpu(cpu);
                    let _intr = IntrGuard::new(&self.port);
                    if cpu
                        .queue(entry.level)
                        .remove_and_kill(entry, cpu.pending_word())
                    {
                        log::trace!("softintr_disestablish: unlinked from {:?}", cpu.id);
                        break;
                    }
                }
            }
            // The state changed under us (dispatched or scheduled
            // elsewhere); look again
        }

        let removed = {
            let _intr = IntrGuard::new(&self.port);
            self.handles.lock().try_remove(entry.key)
        };
        debug_assert!(removed.is_some());
        log::debug!("softintr_disestablish: {entry:?}");
    }

    /// Mark `handle` pending on the calling CPU.
    ///
    /// Returns `true` if it was linked, `false` if it was already pending
    /// (on any CPU) or has been disestablished. Never runs the handler
    /// itself and never blocks, so it's safe to call from a hardware
    /// interrupt handler.
    pub fn schedule(&self, handle: &SoftIntrHandle) -> bool {
        let cpu = self.current();
        let level = handle.level();
        let counters = cpu.counters(level);

        let result = {
            let _intr = IntrGuard::new(&self.port);
            cpu.queue(level).enqueue(&handle.entry, cpu.pending_word())
        };

        match result {
            Enqueue::Linked => {
                log::trace!("softintr_schedule: {handle:?} on {:?}", cpu.id);
                counters.count_scheduled();
                self.port.request_dispatch(cpu.id, level);
                true
            }
            Enqueue::AlreadyPending => {
                counters.count_coalesced();
                false
            }
            Enqueue::Dead => {
                log::warn!("softintr_schedule: {handle:?} has been disestablished");
                false
            }
        }
    }

    /// Get the number of live handles.
    pub fn established(&self) -> usize {
        let _intr = IntrGuard::new(&self.port);
        self.handles.lock().len()
    }

    /// Take a snapshot of the counters.
    pub fn stats(&self) -> Stats {
        Stats {
            established: self.established(),
            cpus: self
                .cpus
                .iter()
                .map(|cpu| {
                    CpuStats::new(
                        cpu.id,
                        Level::BY_INDEX.map(|level| cpu.counters(level).snapshot()),
                    )
                })
                .collect::<Vec<_>>(),
        }
    }
}

impl<P: Port + core::fmt::Debug> core::fmt::Debug for SoftIntr<P> {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("SoftIntr")
            .field("port", &self.port)
            .field("config", &self.config)
            .field("cpus", &self.cpus)
            .finish_non_exhaustive()
    }
}
