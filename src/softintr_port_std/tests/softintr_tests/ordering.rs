//! Randomized checks of dispatch order, masking, and IPL nesting.
use quickcheck_macros::quickcheck;
use softintr::{Config, CpuId, Ipl, Level, LevelSet, NIPL, NUM_LEVELS};
use softintr_port_std::boot;
use spin::Mutex as SpinMutex;
use std::{cmp::Reverse, sync::Arc};

const NUM_HANDLES: usize = 8;

fn ipl(x: u8) -> Ipl {
    Ipl::new(x % NIPL as u8).unwrap()
}

/// Whatever the schedule calls, a lowering runs each scheduled handle once,
/// higher levels first, and in the order of first scheduling within a level.
#[quickcheck]
fn dispatch_order(picks: Vec<u8>) -> bool {
    crate::init();
    let sys = boot(Config::default()).unwrap();
    let log = Arc::new(SpinMutex::new(Vec::new()));
    let handles: Vec<_> = (0..NUM_HANDLES)
        .map(|i| {
            let log = Arc::clone(&log);
            let level = Level::from_index(i % NUM_LEVELS).unwrap();
            sys.establish(level, move || log.lock().push(i)).unwrap()
        })
        .collect();

    let mut expected = Vec::new();
    let s = sys.raise(Ipl::HIGH);
    for pick in picks {
        let i = pick as usize % NUM_HANDLES;
        sys.schedule(&handles[i]);
        if !expected.contains(&i) {
            expected.push(i);
        }
    }
    sys.restore(s);

    // Stable, so FIFO order survives within a level
    expected.sort_by_key(|&i| Reverse(handles[i].level()));

    let log = log.lock();
    log.len() == expected.len() && *log == expected
}

/// Lowering to `target` runs exactly the scheduled levels `target` admits and
/// leaves the rest pending.
#[quickcheck]
fn lowering_admits_exactly_unmasked(target: u8, scheduled: u8) -> bool {
    crate::init();
    let target = ipl(target);
    let scheduled = LevelSet::from_bits_truncate(scheduled);
    let sys = boot(Config::default()).unwrap();
    let log = Arc::new(SpinMutex::new(Vec::new()));
    let handles: Vec<_> = Level::ALL
        .into_iter()
        .map(|level| {
            let log = Arc::clone(&log);
            sys.establish(level, move || log.lock().push(level)).unwrap()
        })
        .collect();

    sys.raise(Ipl::MAX);
    for h in &handles {
        if scheduled.has(h.level()) {
            sys.schedule(h);
        }
    }
    sys.lower(target);

    let admitted = sys.mask_table().admitted(target);
    let ran: Vec<_> = (scheduled & admitted).levels().collect();
    *log.lock() == ran
        && sys.pending(CpuId(0)) == scheduled - admitted
        && sys.current_ipl() == target
}

/// Restoring nested raises in reverse order ends where it started, and the
/// IPL never drops while raising.
#[quickcheck]
fn nested_raise_round_trip(ipls: Vec<u8>) -> bool {
    crate::init();
    let sys = boot(Config::default()).unwrap();
    let mut saved = Vec::new();
    let mut highest = Ipl::NONE;

    for x in ipls {
        let ipl = ipl(x);
        saved.push(sys.raise(ipl));
        highest = highest.max(ipl);
        if sys.current_ipl() != highest {
            return false;
        }
    }

    while let Some(s) = saved.pop() {
        sys.restore(s);
    }

    sys.current_ipl() == Ipl::NONE && sys.port().hardware_priority(CpuId(0)) == Ipl::NONE
}
