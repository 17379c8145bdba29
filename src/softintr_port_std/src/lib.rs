//! Simulation environment for running [`softintr`] on a hosted environment.
//!
//! Each simulated CPU is a set of registers (hardware priority, interrupt
//! enable flag, pending dispatch requests) in a [`StdPort`]. Host threads
//! [bind](bind_current_thread) themselves to a simulated CPU; a thread that
//! hasn't done so acts as CPU 0.
//!
//! Nothing stops two threads from acting as the same CPU at once, which a
//! real CPU can't do. The per-CPU state isn't built for that, so at most one
//! thread may run on each simulated CPU at a time. In particular, only one
//! unbound thread may use a [`SoftIntr`] while others are running.
//!
//! ```
//! use softintr::{Config, Ipl, Level};
//! use softintr_port_std::boot;
//!
//! softintr_port_std::init_logger();
//! let system = boot(Config::default()).unwrap();
//! let handle = system.establish(Level::Network, || println!("softnet")).unwrap();
//!
//! system.hardware_interrupt(Ipl::NET, || system.schedule(&handle));
//! assert_eq!(system.stats().softs(), 1);
//! ```
use softintr::{Config, ConfigError, CpuId, Ipl, Level, LevelSet, Port, SoftIntr};
use spin::Mutex as SpinMutex;
use std::{
    cell::Cell,
    fmt,
    sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering},
    thread,
};

mod env;

pub use self::env::{config_from_env, config_from_vars, EnvConfigError, ENV_CPUS, ENV_SPLASSERT};

thread_local! {
    /// The simulated CPU the current thread runs on. `None` means CPU 0.
    static THREAD_CPU: Cell<Option<CpuId>> = Cell::new(None);
}

/// Make the current thread run on the simulated CPU `cpu` from now on.
///
/// The binding is per-thread and applies to every [`StdPort`].
pub fn bind_current_thread(cpu: CpuId) {
    log::trace!("binding {:?} to {cpu:?}", thread::current().id());
    THREAD_CPU.with(|c| c.set(Some(cpu)));
}

/// Get the simulated CPU the current thread was bound to, if any.
pub fn current_binding() -> Option<CpuId> {
    THREAD_CPU.with(|c| c.get())
}

/// Spawn a thread bound to the simulated CPU `cpu`.
///
/// `cpu` is checked against the port the first time the thread uses one.
pub fn spawn_on<F, R>(cpu: CpuId, f: F) -> thread::JoinHandle<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    thread::Builder::new()
        .name(format!("{cpu}"))
        .spawn(move || {
            bind_current_thread(cpu);
            f()
        })
        .unwrap_or_else(|e| panic!("failed to spawn a thread for {cpu:?}: {e}"))
}

/// Install `env_logger` (configured by `RUST_LOG`). Does nothing if a logger
/// is already installed.
pub fn init_logger() {
    let _ = env_logger::try_init();
}

/// Create a [`SoftIntr`] on a fresh [`StdPort`] with as many simulated CPUs
/// as `config` asks for.
pub fn boot(config: Config) -> Result<SoftIntr<StdPort>, ConfigError> {
    let port = StdPort::new(config.num_cpus);
    SoftIntr::new(config, port)
}

/// [`boot`] with the configuration from [`config_from_env`]. Environment
/// errors are logged and the defaults used instead.
pub fn boot_from_env() -> Result<SoftIntr<StdPort>, ConfigError> {
    let config = config_from_env().unwrap_or_else(|e| {
        log::warn!("ignoring the environment: {e}");
        Config::default()
    });
    boot(config)
}

/// The registers of one simulated CPU.
struct SimCpu {
    hw_priority: AtomicU8,
    interrupts_enabled: AtomicBool,
    /// Levels for which a dispatch was requested and not yet taken.
    dispatch_requested: SpinMutex<LevelSet>,
    num_dispatch_requests: AtomicUsize,
}

impl SimCpu {
    fn new() -> Self {
        Self {
            hw_priority: AtomicU8::new(Ipl::NONE.get()),
            interrupts_enabled: AtomicBool::new(true),
            dispatch_requested: SpinMutex::new(LevelSet::empty()),
            num_dispatch_requests: AtomicUsize::new(0),
        }
    }
}

/// A [`Port`] backed by simulated CPUs.
pub struct StdPort {
    cpus: Box<[SimCpu]>,
}

impl StdPort {
    /// Create a port with `num_cpus` simulated CPUs, all at [`Ipl::NONE`]
    /// with interrupts enabled.
    pub fn new(num_cpus: usize) -> Self {
        Self {
            cpus: (0..num_cpus).map(|_| SimCpu::new()).collect(),
        }
    }

    pub fn num_cpus(&self) -> usize {
        self.cpus.len()
    }

    fn sim_cpu(&self, cpu: CpuId) -> &SimCpu {
        match self.cpus.get(cpu.0) {
            Some(sim) => sim,
            None => panic!(
                "{cpu:?} doesn't exist (the port has {} CPUs)",
                self.cpus.len()
            ),
        }
    }

    /// Get the value last written to `cpu`'s simulated priority register.
    pub fn hardware_priority(&self, cpu: CpuId) -> Ipl {
        let x = self.sim_cpu(cpu).hw_priority.load(Ordering::Relaxed);
        Ipl::new(x).unwrap_or(Ipl::MAX)
    }

    /// Return `true` if interrupts are enabled on `cpu`.
    pub fn interrupts_enabled(&self, cpu: CpuId) -> bool {
        self.sim_cpu(cpu).interrupts_enabled.load(Ordering::Relaxed)
    }

    /// Get the number of dispatch requests `cpu` has received so far.
    pub fn dispatch_requests(&self, cpu: CpuId) -> usize {
        self.sim_cpu(cpu).num_dispatch_requests.load(Ordering::Relaxed)
    }

    /// Acknowledge `cpu`'s outstanding dispatch requests, returning the
    /// levels they were made for.
    pub fn take_dispatch_requests(&self, cpu: CpuId) -> LevelSet {
        core::mem::take(&mut *self.sim_cpu(cpu).dispatch_requested.lock())
    }

    /// Deliver the calling CPU's outstanding dispatch requests the way a
    /// self-interrupt would: if any are outstanding, run
    /// [`SoftIntr::dispatch_pending`] on `system`. Returns `false` if there
    /// was nothing to deliver.
    pub fn deliver_dispatch(system: &SoftIntr<Self>) -> bool {
        let port = system.port();
        let cpu = port.current_cpu();
        if port.take_dispatch_requests(cpu).is_empty() {
            return false;
        }
        log::trace!("{cpu:?}: delivering the dispatch request");
        system.dispatch_pending();
        true
    }
}

impl Port for StdPort {
    /// Get the CPU the calling thread is bound to, or CPU 0 for an unbound
    /// thread. Unbound threads all share CPU 0 and must not use it
    /// concurrently.
    ///
    /// # Panics
    ///
    /// Panics if the thread is bound to a CPU this port doesn't have.
    fn current_cpu(&self) -> CpuId {
        let cpu = current_binding().unwrap_or(CpuId(0));
        if cpu.0 >= self.cpus.len() {
            panic!(
                "{:?} is bound to {cpu:?}, but the port has {} CPUs",
                thread::current().id(),
                self.cpus.len()
            );
        }
        cpu
    }

    fn set_hardware_priority(&self, cpu: CpuId, ipl: Ipl) {
        self.sim_cpu(cpu)
            .hw_priority
            .store(ipl.get(), Ordering::Relaxed);
    }

    fn disable_interrupts(&self) -> bool {
        let cpu = self.current_cpu();
        self.sim_cpu(cpu)
            .interrupts_enabled
            .swap(false, Ordering::Acquire)
    }

    fn restore_interrupts(&self, was_enabled: bool) {
        let cpu = self.current_cpu();
        self.sim_cpu(cpu)
            .interrupts_enabled
            .store(was_enabled, Ordering::Release);
    }

    fn request_dispatch(&self, cpu: CpuId, level: Level) {
        log::trace!("{cpu:?}: dispatch requested for {level}");
        let sim = self.sim_cpu(cpu);
        *sim.dispatch_requested.lock() |= level.bit();
        sim.num_dispatch_requests.fetch_add(1, Ordering::Relaxed);
    }
}

impl fmt::Debug for StdPort {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_list()
            .entries((0..self.cpus.len()).map(|i| {
                let cpu = CpuId(i);
                (
                    cpu,
                    self.hardware_priority(cpu),
                    self.interrupts_enabled(cpu),
                )
            }))
            .finish()
    }
}
