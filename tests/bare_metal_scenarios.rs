//! QEMU-run integration tier for the scenarios in spec.md §8 that need real
//! hardware: S4 (interrupt re-raise/unregister) and S5 (sleep accuracy).
//! S6 (executor idle-halt) is instead covered by two host-drivable unit
//! tests in `kernel::executor`'s `#[cfg(test)]` module, since the part of
//! it that isn't already exercised by a real tick source is just task-list
//! bookkeeping and wake-up-list liveness.
//!
//! Structured like `other_examples/.../cell0/kernel/tests/bare_metal/
//! basic_boot.rs`: its own `#![no_std] #![no_main]`, a `custom_test_frameworks`
//! runner, and a boot path separate from the main kernel binary's `_start`/
//! `kmain` (same Multiboot1 header and protected-mode entry shape as
//! `src/main.rs`, grounded the same way on
//! `other_examples/0650338c_maestro-os-maestro__kernel-src-boot.rs.rs`).

#![no_std]
#![no_main]
#![feature(custom_test_frameworks)]
#![test_runner(test_runner)]
#![reexport_test_harness_main = "test_main"]

use core::arch::{asm, global_asm};
use core::panic::PanicInfo;
use core::sync::atomic::{AtomicU32, Ordering};

use mb_rtc_kernel::kernel::gdt;
use mb_rtc_kernel::kernel::idt;
use mb_rtc_kernel::kernel::pic;
use mb_rtc_kernel::kernel::qemu;
use mb_rtc_kernel::kernel::rtc;
use mb_rtc_kernel::kernel::serial::SERIAL_PORT;

const MULTIBOOT1_FLAGS: u32 = 0x0000_0003;

global_asm!(
    r#"
.intel_syntax noprefix

.section .multiboot_header, "a"
.align 4
multiboot_header:
    .long 0x1BADB002
    .long {flags}
    .long -(0x1BADB002 + {flags})

.section .bss, "aw", @nobits
.align 16
boot_stack_bottom:
    .skip {stack_size}
boot_stack_top:

.section .text
.global _start
_start:
    mov esp, offset boot_stack_top
    xor ebp, ebp
    call test_kmain
    ud2

.att_syntax prefix
"#,
    flags = const MULTIBOOT1_FLAGS,
    stack_size = const 0x10000,
);

/// Brings up just enough of the kernel (serial, GDT, IDT, PIC, RTC) for the
/// scenarios below, then hands off to the generated `test_main`. Skips the
/// heap and executor deliberately -- neither S4 nor S5 allocates.
#[unsafe(no_mangle)]
extern "C" fn test_kmain() -> ! {
    unsafe {
        SERIAL_PORT.init();
        SERIAL_PORT.write_str("\nrunning bare-metal scenario tests\n");
    }

    gdt::init();
    idt::init();
    pic::init();
    pic::remap();
    if rtc::init().is_err() {
        qemu::exit_failed();
    }

    test_main();

    qemu::exit_success();
}

fn test_runner(tests: &[&dyn Fn()]) {
    unsafe {
        SERIAL_PORT.write_str("running ");
    }
    for test in tests {
        test();
    }
    unsafe {
        SERIAL_PORT.write_str("all scenarios passed\n");
    }
}

#[panic_handler]
fn panic(_info: &PanicInfo) -> ! {
    unsafe {
        SERIAL_PORT.write_str("[failed] scenario panicked\n");
    }
    qemu::exit_failed();
}

static S4_HITS: AtomicU32 = AtomicU32::new(0);

fn s4_handler(_vector: u8, _error_code: u32) {
    S4_HITS.fetch_add(1, Ordering::SeqCst);
}

/// S4: `register(0x81, h); raise 0x81; raise 0x81; unregister(0x81)` -> `h`
/// observed two calls, and post-unregister `get(0x81)` is `None`.
#[test_case]
fn scenario_s4_interrupt_reraise_and_unregister() {
    idt::register(0x81, s4_handler);

    unsafe {
        asm!("int 0x81");
        asm!("int 0x81");
    }

    assert_eq!(S4_HITS.load(Ordering::SeqCst), 2, "handler must observe exactly two raises");

    idt::unregister(0x81);
    assert!(idt::get(0x81).is_none(), "vector must be clear after unregister");
}

/// S5: at 256 Hz, `sleep_seconds(2)` returns with tick delta in [510, 514].
#[test_case]
fn scenario_s5_sleep_accuracy() {
    rtc::start_periodic_ticks();

    let before = rtc::ticks();
    rtc::sleep_seconds(2);
    let after = rtc::ticks();

    let delta = after.wrapping_sub(before);
    assert!((510..=514).contains(&delta), "tick delta {delta} outside [510, 514]");

    rtc::stop_periodic_ticks();
}
