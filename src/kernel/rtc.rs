//! CMOS/RTC driver used as the kernel's 256 Hz monotonic tick source.
//!
//! Grounded in `original_source/rtc.c`/`rtc.h`: index/data port pair with the
//! NMI-disable bit, update-in-progress-guarded register access, periodic
//! interrupts through register B's PIE bit at a register-A rate that yields
//! 256 Hz, and a wake-up list scanned from the tick handler so sleeping
//! futures can be resumed without busy-polling from interrupt context.

use log::warn;
use spin::{Mutex, Once};

use crate::kernel::critical;
use crate::kernel::idt;
use crate::kernel::pic::{self, IrqId};
use crate::kernel::port::{self, PortHandle};

const CMOS_CONTROL_PORT: u16 = 0x70;
const CMOS_DATA_PORT: u16 = 0x71;
const NMI_DISABLE_MASK: u8 = 0x80;

const REG_SECONDS: u8 = 0x00;
const REG_MINUTES: u8 = 0x02;
const REG_HOURS: u8 = 0x04;
const REG_A: u8 = 0x0A;
const REG_B: u8 = 0x0B;
const REG_C: u8 = 0x0C;

const REG_A_RATE_256HZ: u8 = 0x28; // divider 010, rate selector 1000 -> 32768 / 2^7 = 256
const REG_B_PIE: u8 = 1 << 6;
const REG_B_24_HOUR: u8 = 1 << 1;
const REG_B_BINARY: u8 = 1 << 2;
const REG_A_UIP: u8 = 1 << 7;

/// The IRQ line the RTC is wired to on a standard PC (cascaded through the
/// slave PIC's first input), i.e. post-remap vector 0x48.
pub const TICK_IRQ: IrqId = IrqId::PicSlave(0);

struct Ports {
    control: PortHandle,
    data: PortHandle,
}

static PORTS: Once<Ports> = Once::new();

/// Whether NMI stays enabled across register accesses. Nothing in this
/// driver ever toggles it at runtime, so it is a plain constant rather than
/// a lock -- taking a mutex here would be shared mutable state with no
/// mutation, and on a single core it can deadlock against the tick
/// handler's own register reads (see [`update_guarded`]).
const NMI_ENABLED: bool = true;

fn ports() -> &'static Ports {
    PORTS.get().expect("rtc::init must run before any other rtc:: call")
}

fn read_register(reg: u8) -> u8 {
    let p = ports();
    let nmi_mask = if NMI_ENABLED { 0x00 } else { NMI_DISABLE_MASK };
    unsafe {
        port::write_port_b(&p.control, reg | nmi_mask);
        port::read_port_b(&p.data)
    }
}

fn write_register(reg: u8, value: u8) {
    let p = ports();
    let nmi_mask = if NMI_ENABLED { 0x00 } else { NMI_DISABLE_MASK };
    unsafe {
        port::write_port_b(&p.control, reg | nmi_mask);
        port::write_port_b(&p.data, value);
    }
}

fn update_in_progress() -> bool {
    read_register(REG_A) & REG_A_UIP != 0
}

/// Runs `op` only once the update-in-progress flag is clear on entry, and
/// retries if it became set again (an update started) before `op` finished.
///
/// The whole retry loop runs under the critical section (C7): the tick
/// handler reads register C on every periodic interrupt, and letting it
/// preempt an in-progress guarded read/write here would interleave the two
/// register-select writes on the shared index port.
fn update_guarded<T>(mut op: impl FnMut() -> T) -> T {
    critical::with(|| loop {
        while update_in_progress() {}
        let result = op();
        if !update_in_progress() {
            return result;
        }
    })
}

/// Acquires the CMOS ports and configures 24-hour, binary-coded format.
/// Does not enable periodic interrupts; call [`start_periodic_ticks`] for
/// that once the IDT and PIC are ready.
pub fn init() -> Result<(), &'static str> {
    let control = port::request_port(CMOS_CONTROL_PORT).ok_or("CMOS control port already in use")?;
    let data = port::request_port(CMOS_DATA_PORT).ok_or("CMOS data port already in use")?;
    PORTS.call_once(|| Ports { control, data });

    let mut reg_b = read_register(REG_B);
    reg_b |= REG_B_24_HOUR | REG_B_BINARY;
    write_register(REG_B, reg_b);

    Ok(())
}

/// Reads seconds/minutes/hours as a UIP-guarded triple. Values are whatever
/// format register B was configured for (binary, in our case).
pub fn read_time() -> (u8, u8, u8) {
    update_guarded(|| {
        (
            read_register(REG_SECONDS),
            read_register(REG_MINUTES),
            read_register(REG_HOURS),
        )
    })
}

/// Writes seconds/minutes/hours as a UIP-guarded triple.
pub fn write_time(seconds: u8, minutes: u8, hours: u8) {
    update_guarded(|| {
        write_register(REG_SECONDS, seconds);
        write_register(REG_MINUTES, minutes);
        write_register(REG_HOURS, hours);
    });
}

static TICKS: core::sync::atomic::AtomicU32 = core::sync::atomic::AtomicU32::new(0);

/// Monotonic tick count since [`start_periodic_ticks`] was called. Wraps at
/// `u32::MAX`, same as the original's `atomic_uint_fast32_t` counter.
pub fn ticks() -> u32 {
    TICKS.load(core::sync::atomic::Ordering::SeqCst)
}

const MAX_WAKE_ENTRIES: usize = 32;

#[derive(Clone, Copy)]
struct WakeUpEntry {
    target_tick: u32,
    callback: fn(usize),
    context: usize,
}

static WAKE_LIST: Mutex<[Option<WakeUpEntry>; MAX_WAKE_ENTRIES]> = Mutex::new([None; MAX_WAKE_ENTRIES]);

/// Registers `callback(context)` to run (from interrupt context, during the
/// next tick handler invocation) once [`ticks`] reaches `target_tick`.
/// Returns `false` if the wake-up list is full.
pub fn wake_up_list_add(target_tick: u32, callback: fn(usize), context: usize) -> bool {
    let mut list = WAKE_LIST.lock();
    for slot in list.iter_mut() {
        if slot.is_none() {
            *slot = Some(WakeUpEntry { target_tick, callback, context });
            return true;
        }
    }
    false
}

fn wake_up_list_check_and_execute() {
    let mut list = WAKE_LIST.lock();
    let now = ticks();
    for slot in list.iter_mut() {
        if let Some(entry) = slot {
            if now >= entry.target_tick {
                (entry.callback)(entry.context);
                *slot = None;
            }
        }
    }
}

/// Test-only hook: runs one wake-up-list scan/execute pass without waiting
/// for a real tick interrupt. Exercises the same liveness path the tick
/// handler drives on hardware, for tests that drive [`ticks`]/the wake-up
/// list directly instead of booting under QEMU.
#[cfg(test)]
pub(crate) fn drain_wake_up_list_for_test() {
    wake_up_list_check_and_execute();
}

fn clear_rtc_interrupt() {
    // Register C latches which interrupt sources fired; reading it is what
    // re-arms the next one.
    let _ = read_register(REG_C);
}

fn tick_handler(_vector: u8, _error_code: u32) {
    clear_rtc_interrupt();
    TICKS.fetch_add(1, core::sync::atomic::Ordering::SeqCst);
    wake_up_list_check_and_execute();
}

/// Sets register A's rate to 256 Hz, registers the internal tick handler on
/// [`TICK_IRQ`], sets register B's PIE bit, and unmasks the IRQ line.
pub fn start_periodic_ticks() {
    let mut reg_a = read_register(REG_A);
    reg_a = (reg_a & 0xF0) | (REG_A_RATE_256HZ & 0x0F);
    write_register(REG_A, reg_a);

    idt::register_irq(TICK_IRQ, tick_handler);

    let mut reg_b = read_register(REG_B);
    reg_b |= REG_B_PIE;
    write_register(REG_B, reg_b);

    clear_rtc_interrupt();
    pic::unmask_irq(8);
}

/// Reverses [`start_periodic_ticks`]: masks the IRQ, clears PIE, and
/// unregisters the handler.
pub fn stop_periodic_ticks() {
    pic::mask_irq(8);

    let mut reg_b = read_register(REG_B);
    reg_b &= !REG_B_PIE;
    write_register(REG_B, reg_b);

    idt::unregister(pic::to_vector(TICK_IRQ));
}

/// Number of `hlt` iterations to tolerate before assuming the tick counter
/// is not advancing (e.g. interrupts are masked) and giving up.
const SLEEP_SAFETY_BOUND: u32 = 1_000_000;

/// Records a target tick, enables interrupts, and `hlt`s until the counter
/// reaches it. Prefer the async sleep future in `futures.rs` from
/// executor-managed tasks; this is for straight-line init-time code.
///
/// Bails out after [`SLEEP_SAFETY_BOUND`] iterations with a diagnostic if
/// the counter never reaches the target, which would otherwise hang forever
/// with interrupts masked or the RTC tick source not running.
pub fn sleep_ticks(count: u32) {
    let target = ticks().wrapping_add(count);

    unsafe {
        core::arch::asm!("sti", options(nomem, nostack, preserves_flags));
    }

    let mut iterations = 0u32;
    while ticks() < target {
        if iterations >= SLEEP_SAFETY_BOUND {
            warn!(
                "rtc::sleep_ticks: tick counter stalled at {} (target {}) after {} iterations, giving up",
                ticks(),
                target,
                iterations
            );
            return;
        }

        unsafe {
            core::arch::asm!("hlt", options(nomem, nostack, preserves_flags));
        }
        iterations += 1;
    }
}

/// `hlt`-waits for `seconds` seconds, assuming the standard 256 Hz tick rate.
pub fn sleep_seconds(seconds: u32) {
    sleep_ticks(seconds.saturating_mul(256));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_byte_is_256hz_selector() {
        // divider bits 010, rate selector 1000 => 32768 / 2^(8-1) = 256 Hz
        assert_eq!(REG_A_RATE_256HZ & 0x0F, 8);
        assert_eq!((REG_A_RATE_256HZ >> 4) & 0x07, 0b010);
    }

    #[test]
    fn wake_up_list_add_fires_when_capacity_available() {
        // Uses the real global list; only verifies bookkeeping, never CMOS
        // I/O, so it is safe to run on a host target.
        static mut FIRED: bool = false;
        fn mark(_ctx: usize) {
            unsafe {
                FIRED = true;
            }
        }
        assert!(wake_up_list_add(0, mark, 0));
        wake_up_list_check_and_execute();
        assert!(unsafe { FIRED });
    }

    #[test]
    fn wake_up_list_rejects_once_full() {
        let mut filled = 0;
        fn noop(_ctx: usize) {}
        for _ in 0..MAX_WAKE_ENTRIES * 2 {
            if wake_up_list_add(u32::MAX, noop, 0) {
                filled += 1;
            }
        }
        assert!(filled <= MAX_WAKE_ENTRIES);
    }
}
