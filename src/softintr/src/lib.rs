//! Priority-ordered software interrupts.
//!
//! A hardware interrupt handler usually has follow-up work that doesn't need
//! to run with the device's interrupt masked: handing a packet to the
//! network stack, expiring timeouts, waking up a terminal reader. This crate
//! lets the handler *schedule* that work on a [`SoftIntrHandle`]. The work
//! then runs on the same CPU once the CPU's interrupt priority level ([`Ipl`])
//! drops below the handle's [`Level`], highest level first and in FIFO order
//! within a level.
//!
//! # Overview
//!
//! ```text
//!   hardware interrupt ──▶ handler calls `schedule(h)` ──▶ trap return
//!                                                              │
//!                                        `restore(saved_ipl)` ◀┘
//!                                                 │
//!                          dispatch loop: Clock ▶ Network ▶ Tty ▶ Generic
//! ```
//!
//!  - [`SoftIntr`] owns everything: the per-CPU IPL, pending mask and queues,
//!    the mask table, and the handle table. It's created once by CPU bring-up
//!    code, before interrupts are enabled.
//!  - [`SoftIntr::establish`] / [`SoftIntr::disestablish`] register and
//!    retire handlers.
//!  - [`SoftIntr::schedule`] marks a handle pending on the calling CPU.
//!  - [`SoftIntr::raise`], [`SoftIntr::lower`], and [`SoftIntr::restore`]
//!    form the priority gate (`splraise`, `spllower`, and `splx`). Lowering
//!    the IPL runs every pending handler it unmasks.
//!
//! The hardware is reached only through a [`Port`].
//!
//! # Concurrency
//!
//! Each CPU has its own queues. A handle scheduled on a CPU runs on that CPU.
//! Queue manipulation happens with interrupts disabled (through
//! [`Port::disable_interrupts`]) and the queue's spin lock held; handlers run
//! outside every internal lock, so they may call back into [`SoftIntr`].
//!
//! Handlers run to completion and must not block. A panicking handler takes
//! the system down with it.
#![cfg_attr(not(test), no_std)] // Link `std` only when building a test (`cfg(test)`)
#![deny(unsafe_code)]

extern crate alloc;

mod config;
mod cpu;
mod dispatch;
mod error;
mod handle;
mod ipl;
mod klock;
mod level;
mod mask;
mod queue;
mod spl;
mod stats;
mod system;

pub use self::{
    config::{Config, SplAssertPolicy, MAX_CPUS},
    cpu::{CpuId, DispatchState},
    error::{ConfigError, EstablishError, InvalidLevelError, ParsePolicyError},
    handle::{SoftIntrHandle, SoftIntrHandler},
    ipl::{Ipl, NIPL},
    klock::IntrGuard,
    level::{Level, LevelSet, NUM_LEVELS},
    mask::MaskTable,
    spl::SplGuard,
    stats::{CpuStats, LevelStats, Stats},
    system::SoftIntr,
};

/// The hardware-facing half of the mechanism.
///
/// A port implements this on whatever represents its interrupt controller.
/// All methods are called on the CPU they concern unless stated otherwise,
/// and none of them may call back into [`SoftIntr`].
pub trait Port: Send + Sync + 'static {
    /// Get the CPU the caller is running on.
    fn current_cpu(&self) -> CpuId;

    /// Program `cpu`'s interrupt controller so that hardware sources at or
    /// below `ipl` are held off.
    fn set_hardware_priority(&self, cpu: CpuId, ipl: Ipl);

    /// Disable interrupts on the current CPU. Returns whether they were
    /// enabled, to be passed to [`Self::restore_interrupts`].
    fn disable_interrupts(&self) -> bool;

    /// Undo [`Self::disable_interrupts`].
    fn restore_interrupts(&self, was_enabled: bool);

    /// Called after a handle of `level` was linked into `cpu`'s queue. A
    /// port may post a self-interrupt that ends up calling
    /// [`SoftIntr::dispatch_pending`]; the default relies on the next IPL
    /// lowering instead.
    fn request_dispatch(&self, cpu: CpuId, level: Level) {
        let _ = (cpu, level);
    }
}
