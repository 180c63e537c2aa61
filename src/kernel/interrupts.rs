//! 32-bit interrupt frame and the common dispatcher every stub funnels into.
//!
//! `isr_dispatch` is called from `isr_common_stub` (`interrupts_asm.rs`) with
//! a pointer to the register state `pusha` just saved. CPU exceptions that
//! have no sane recovery are handled here directly; everything else goes
//! through the IDT's dynamic handler registry, then gets an EOI sent if it
//! came from the PIC.

use core::arch::asm;

use log::error;

use crate::kernel::idt;
use crate::kernel::pic;

/// Register state as left by `pusha`, plus what the stub and the CPU pushed
/// on top of it. Field order matches memory order low-to-high, i.e. the
/// order `popa` expects.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct InterruptFrame {
    pub edi: u32,
    pub esi: u32,
    pub ebp: u32,
    pub esp_dummy: u32,
    pub ebx: u32,
    pub edx: u32,
    pub ecx: u32,
    pub eax: u32,
    pub vector: u32,
    pub error_code: u32,
    pub eip: u32,
    pub cs: u32,
    pub eflags: u32,
}

const DIVIDE_ERROR: u32 = 0;
const INVALID_OPCODE: u32 = 6;
const DOUBLE_FAULT: u32 = 8;
const GENERAL_PROTECTION_FAULT: u32 = 13;
const PAGE_FAULT: u32 = 14;

fn exception_name(vector: u32) -> &'static str {
    match vector {
        0 => "divide error",
        1 => "debug",
        2 => "non-maskable interrupt",
        3 => "breakpoint",
        4 => "overflow",
        5 => "bound range exceeded",
        6 => "invalid opcode",
        7 => "device not available",
        8 => "double fault",
        10 => "invalid TSS",
        11 => "segment not present",
        12 => "stack segment fault",
        13 => "general protection fault",
        14 => "page fault",
        16 => "x87 floating-point exception",
        17 => "alignment check",
        18 => "machine check",
        19 => "SIMD floating-point exception",
        _ => "reserved exception",
    }
}

fn read_cr2() -> u32 {
    let value: u32;
    unsafe {
        asm!("mov {}, cr2", out(reg) value, options(nomem, nostack, preserves_flags));
    }
    value
}

fn is_fatal(vector: u32) -> bool {
    matches!(
        vector,
        DIVIDE_ERROR | INVALID_OPCODE | DOUBLE_FAULT | GENERAL_PROTECTION_FAULT | PAGE_FAULT
    )
}

/// Main interrupt dispatcher, called from assembly with a pointer to the
/// saved register frame.
#[unsafe(no_mangle)]
pub extern "C" fn isr_dispatch(frame: *mut InterruptFrame) {
    let frame = unsafe { &*frame };
    let vector = frame.vector;

    if is_fatal(vector) {
        fatal_exception(frame);
    }

    if let Some(handler) = idt::get(vector as u8) {
        handler(vector as u8, frame.error_code);
    } else if vector < 32 {
        error!("unhandled CPU exception {} ({})", vector, exception_name(vector));
    }

    if (pic::MASTER_VECTOR_BASE as u32..pic::MASTER_VECTOR_BASE as u32 + 16).contains(&vector) {
        pic::send_eoi(vector as u8);
    }
}

fn fatal_exception(frame: &InterruptFrame) -> ! {
    error!(
        "fatal exception {} ({}) at eip=0x{:08x} error_code=0x{:08x}",
        frame.vector,
        exception_name(frame.vector),
        frame.eip,
        frame.error_code
    );
    if frame.vector == PAGE_FAULT {
        error!("page fault address cr2=0x{:08x}", read_cr2());
    }
    crate::kernel::log_ring::service();
    halt_system();
}

/// Disables interrupts and halts forever. Used for unrecoverable faults.
pub fn halt_system() -> ! {
    unsafe {
        asm!("cli", options(nomem, nostack, preserves_flags));
        loop {
            asm!("hlt", options(nomem, nostack, preserves_flags));
        }
    }
}
