//! Several simulated CPUs on host threads.
use softintr::{Config, CpuId, Ipl, Level, LevelSet, Port, SoftIntr};
use softintr_port_std::{boot, spawn_on, StdPort};
use spin::Mutex as SpinMutex;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Barrier,
};

const NUM_CPUS: usize = 4;

fn system() -> Arc<SoftIntr<StdPort>> {
    crate::init();
    Arc::new(boot(Config::default().with_num_cpus(NUM_CPUS)).unwrap())
}

#[test]
fn handles_run_on_the_scheduling_cpu() {
    const ROUNDS: usize = 50;
    let sys = system();
    let wrong_cpu = Arc::new(AtomicUsize::new(0));

    let threads: Vec<_> = (0..NUM_CPUS)
        .map(|i| {
            let (sys, wrong_cpu) = (Arc::clone(&sys), Arc::clone(&wrong_cpu));
            spawn_on(CpuId(i), move || {
                let h = sys
                    .establish(Level::Network, {
                        let sys2 = Arc::clone(&sys);
                        move || {
                            if sys2.port().current_cpu() != CpuId(i) {
                                wrong_cpu.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                    })
                    .unwrap();

                for _ in 0..ROUNDS {
                    sys.hardware_interrupt(Ipl::NET, || sys.schedule(&h))
                        .unwrap();
                }
                sys.disestablish(h);
            })
        })
        .collect();

    for t in threads {
        t.join().unwrap();
    }

    assert_eq!(wrong_cpu.load(Ordering::Relaxed), 0);
    let stats = sys.stats();
    for cpu in &stats.cpus {
        assert_eq!(cpu.level(Level::Network).dispatched, ROUNDS, "{:?}", cpu.cpu);
        assert!(sys.port().interrupts_enabled(cpu.cpu));
    }
    assert_eq!(stats.established, 0);
}

#[test]
fn concurrent_schedules_coalesce() {
    const TRIES: usize = 200;
    let sys = system();
    let runs = Arc::new(AtomicUsize::new(0));
    let h = sys
        .establish(Level::Tty, {
            let runs = Arc::clone(&runs);
            move || {
                runs.fetch_add(1, Ordering::Relaxed);
            }
        })
        .unwrap();
    let barrier = Arc::new(Barrier::new(NUM_CPUS));

    let threads: Vec<_> = (0..NUM_CPUS)
        .map(|i| {
            let (sys, h, barrier) = (Arc::clone(&sys), h.clone(), Arc::clone(&barrier));
            spawn_on(CpuId(i), move || {
                let s = sys.raise(Ipl::SOFTTTY);
                for _ in 0..TRIES {
                    sys.schedule(&h);
                }
                // Nobody dispatches until everyone has scheduled
                barrier.wait();
                sys.restore(s);
            })
        })
        .collect();

    for t in threads {
        t.join().unwrap();
    }

    assert_eq!(runs.load(Ordering::Relaxed), 1);
    let total = sys.stats().level(Level::Tty);
    assert_eq!(total.scheduled, 1);
    assert_eq!(total.coalesced, NUM_CPUS * TRIES - 1);
    assert_eq!(total.dispatched, 1);
}

#[test]
fn disestablish_from_another_cpu() {
    let sys = system();
    let log = Arc::new(SpinMutex::new(Vec::new()));
    let h = sys
        .establish(Level::Clock, {
            let log = Arc::clone(&log);
            move || log.lock().push("clock")
        })
        .unwrap();
    let (scheduled, disestablished) = (Arc::new(Barrier::new(2)), Arc::new(Barrier::new(2)));

    let t = {
        let (sys, h) = (Arc::clone(&sys), h.clone());
        let (scheduled, disestablished) = (Arc::clone(&scheduled), Arc::clone(&disestablished));
        spawn_on(CpuId(2), move || {
            let s = sys.raise(Ipl::SOFTCLOCK);
            assert!(sys.schedule(&h));
            scheduled.wait();
            disestablished.wait();
            sys.restore(s);
            assert!(!sys.schedule(&h));
        })
    };

    scheduled.wait();
    assert_eq!(h.pending_cpu(), Some(CpuId(2)));
    assert_eq!(sys.pending(CpuId(2)), LevelSet::CLOCK);
    sys.disestablish(h);
    assert_eq!(sys.pending(CpuId(2)), LevelSet::empty());
    disestablished.wait();
    t.join().unwrap();

    assert!(log.lock().is_empty());
    assert_eq!(sys.stats().level(Level::Clock).dispatched, 0);
}

#[test]
fn cpus_have_independent_ipls() {
    let sys = system();
    let barrier = Arc::new(Barrier::new(NUM_CPUS));
    let ipls = [Ipl::SOFT, Ipl::BIO, Ipl::CLOCK, Ipl::HIGH];

    let threads: Vec<_> = ipls
        .into_iter()
        .enumerate()
        .map(|(i, ipl)| {
            let (sys, barrier) = (Arc::clone(&sys), Arc::clone(&barrier));
            spawn_on(CpuId(i), move || {
                let s = sys.raise(ipl);
                barrier.wait();
                for (j, other) in ipls.into_iter().enumerate() {
                    assert_eq!(sys.ipl_of(CpuId(j)), other);
                    assert_eq!(sys.port().hardware_priority(CpuId(j)), other);
                }
                barrier.wait();
                sys.restore(s);
            })
        })
        .collect();

    for t in threads {
        t.join().unwrap();
    }

    for i in 0..NUM_CPUS {
        assert_eq!(sys.ipl_of(CpuId(i)), Ipl::NONE);
    }
}
