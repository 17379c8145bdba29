//! The priority gate and the trap return path on a single simulated CPU.
use assert_matches::assert_matches;
use softintr::{Config, ConfigError, CpuId, Ipl, Level, LevelSet, SplAssertPolicy};
use softintr_port_std::{
    boot, boot_from_env, config_from_env, config_from_vars, EnvConfigError, StdPort, ENV_CPUS,
    ENV_SPLASSERT,
};
use spin::Mutex as SpinMutex;
use std::sync::Arc;

#[test]
fn boot_rejects_zero_cpus() {
    crate::init();
    assert_matches!(
        boot(Config::default().with_num_cpus(0)),
        Err(ConfigError::NoCpus)
    );
}

#[test]
fn boot_from_environment_variables() {
    crate::init();
    let config = config_from_vars(|name| match name {
        ENV_CPUS => Some("3".to_owned()),
        ENV_SPLASSERT => Some("raise".to_owned()),
        _ => None,
    })
    .unwrap();
    let sys = boot(config).unwrap();
    assert_eq!(sys.num_cpus(), 3);
    assert_eq!(sys.port().num_cpus(), 3);
    assert_eq!(sys.config().splassert, SplAssertPolicy::Raise);
}

/// The only test in this binary that touches the process environment.
#[test]
fn boot_from_process_environment() {
    crate::init();
    std::env::set_var(ENV_CPUS, "2");
    std::env::set_var(ENV_SPLASSERT, "report");
    let config = config_from_env().unwrap();
    assert_eq!(config.num_cpus, 2);
    assert_eq!(config.splassert, SplAssertPolicy::Report);

    let sys = boot_from_env().unwrap();
    assert_eq!(sys.port().num_cpus(), 2);
    assert_eq!(sys.config().splassert, SplAssertPolicy::Report);

    // A bad variable falls back to the defaults
    std::env::set_var(ENV_CPUS, "two");
    assert_eq!(
        config_from_env(),
        Err(EnvConfigError::BadCpus("two".to_owned()))
    );
    let sys = boot_from_env().unwrap();
    assert_eq!(sys.num_cpus(), Config::default().num_cpus);
    assert_eq!(sys.config().splassert, Config::default().splassert);

    std::env::remove_var(ENV_CPUS);
    std::env::remove_var(ENV_SPLASSERT);
}

#[test]
fn hardware_priority_follows_ipl() {
    crate::init();
    let sys = boot(Config::default()).unwrap();
    let port = sys.port();

    let s = sys.raise(Ipl::AUDIO);
    assert_eq!(port.hardware_priority(CpuId(0)), Ipl::AUDIO);
    sys.lower(Ipl::SOFTNET);
    assert_eq!(port.hardware_priority(CpuId(0)), Ipl::SOFTNET);
    sys.restore(s);
    assert_eq!(port.hardware_priority(CpuId(0)), Ipl::NONE);
    assert!(port.interrupts_enabled(CpuId(0)));
}

/// A handle at `Network` (A) and one at `Clock` (B) are scheduled while both
/// are masked, A first. Lowering runs B, then A. A reschedules B, which runs
/// as soon as A returns.
#[test]
fn clock_overtakes_network() {
    crate::init();
    let sys = Arc::new(boot(Config::default()).unwrap());
    let log = Arc::new(SpinMutex::new(Vec::new()));

    let b = sys
        .establish(Level::Clock, {
            let log = Arc::clone(&log);
            move || log.lock().push("B")
        })
        .unwrap();
    let a = sys
        .establish(Level::Network, {
            let (sys, log, b) = (Arc::clone(&sys), Arc::clone(&log), b.clone());
            move || {
                log.lock().push("A");
                let first = log.lock().len() == 2;
                if first {
                    sys.schedule(&b);
                    // Scheduling never dispatches; B waits until we return
                    assert!(b.is_pending());
                }
            }
        })
        .unwrap();

    let s = sys.raise(Ipl::SOFTCLOCK);
    assert!(sys.schedule(&a));
    assert!(sys.schedule(&b));
    assert_eq!(sys.pending(CpuId(0)), LevelSet::NETWORK | LevelSet::CLOCK);
    sys.restore(s);

    assert_eq!(*log.lock(), ["B", "A", "B"]);
    assert_eq!(sys.pending(CpuId(0)), LevelSet::empty());
    assert_eq!(sys.stats().level(Level::Clock).dispatched, 2);
}

#[test]
fn trap_return_runs_deferred_work() {
    crate::init();
    let sys = Arc::new(boot(Config::default()).unwrap());
    let log = Arc::new(SpinMutex::new(Vec::new()));

    let softnet = sys
        .establish(Level::Network, {
            let (sys, log) = (Arc::clone(&sys), Arc::clone(&log));
            move || log.lock().push(("softnet", sys.current_ipl()))
        })
        .unwrap();
    let softclock = sys
        .establish(Level::Clock, {
            let (sys, log) = (Arc::clone(&sys), Arc::clone(&log));
            move || log.lock().push(("softclock", sys.current_ipl()))
        })
        .unwrap();

    // A network interrupt preempted by a clock interrupt
    let handled = sys.hardware_interrupt(Ipl::NET, || {
        sys.schedule(&softnet);
        sys.hardware_interrupt(Ipl::CLOCK, || {
            sys.schedule(&softclock);
        })
        .is_some()
    });
    assert_eq!(handled, Some(true));

    assert_eq!(
        *log.lock(),
        [("softclock", Ipl::SOFTCLOCK), ("softnet", Ipl::SOFTNET)]
    );
    assert_eq!(sys.current_ipl(), Ipl::NONE);
}

#[test]
fn raise_guard_defers_until_drop() {
    crate::init();
    let sys = boot(Config::default()).unwrap();
    let log = Arc::new(SpinMutex::new(Vec::new()));
    let h = sys
        .establish(Level::Tty, {
            let log = Arc::clone(&log);
            move || log.lock().push("tty")
        })
        .unwrap();

    let guard = sys.raise_guard(Ipl::SOFTTTY);
    sys.schedule(&h);
    sys.dispatch_pending();
    assert!(log.lock().is_empty());
    drop(guard);

    assert_eq!(*log.lock(), ["tty"]);
}

#[test]
fn dispatch_request_delivery() {
    crate::init();
    let sys = boot(Config::default()).unwrap();
    let log = Arc::new(SpinMutex::new(Vec::new()));
    let h = sys
        .establish(Level::Generic, {
            let log = Arc::clone(&log);
            move || log.lock().push("soft")
        })
        .unwrap();

    // Scheduling at `NONE` doesn't run anything by itself
    assert!(sys.schedule(&h));
    assert!(log.lock().is_empty());
    assert_eq!(sys.port().dispatch_requests(CpuId(0)), 1);

    assert!(StdPort::deliver_dispatch(&sys));
    assert_eq!(*log.lock(), ["soft"]);
    assert!(!StdPort::deliver_dispatch(&sys));
}

#[test]
fn splassert_raise_policy() {
    crate::init();
    let sys = boot(Config::default().with_splassert(SplAssertPolicy::Raise)).unwrap();
    sys.soft_assert_at_least(Level::Tty);
    assert_eq!(sys.current_ipl(), Ipl::SOFTTTY);
}
