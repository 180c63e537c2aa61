//! 32-bit IDT: one 8-byte gate per vector, all pointing at the generated
//! per-vector stubs, plus a dynamic handler registry that `isr_dispatch`
//! (in `interrupts.rs`) consults at runtime.
//!
//! Mirrors `original_source/idt.c`'s `idt_init`/`register_interrupt_handler`.

use core::arch::asm;
use core::mem::size_of;

use spin::Mutex;

use super::interrupts_asm::ISR_STUBS;
use super::pic::{self, IrqId};

#[repr(C, packed)]
struct IdtDescriptor {
    limit: u16,
    base: u32,
}

/// 32-bit IDT gate descriptor: 8 bytes, split offset, selector, type/attr.
#[repr(C, packed)]
#[derive(Copy, Clone)]
struct IdtEntry {
    offset_low: u16,
    selector: u16,
    zero: u8,
    type_attr: u8,
    offset_high: u16,
}

impl IdtEntry {
    const fn empty() -> Self {
        IdtEntry { offset_low: 0, selector: 0, zero: 0, type_attr: 0, offset_high: 0 }
    }

    fn set(&mut self, handler: unsafe extern "C" fn(), selector: u16, type_attr: u8) {
        let offset = handler as usize as u32;
        self.offset_low = (offset & 0xFFFF) as u16;
        self.selector = selector;
        self.zero = 0;
        self.type_attr = type_attr;
        self.offset_high = ((offset >> 16) & 0xFFFF) as u16;
    }
}

/// Present, ring-0, 32-bit interrupt gate.
const GATE_INTERRUPT_32: u8 = 0x8E;

static mut IDT: [IdtEntry; 256] = [IdtEntry::empty(); 256];

static mut IDT_DESCRIPTOR: IdtDescriptor = IdtDescriptor { limit: 0, base: 0 };

/// A vector's dynamically registered handler. `None` means "unhandled" --
/// `isr_dispatch` logs and moves on rather than crashing, except for the
/// fixed fatal exceptions it handles itself.
pub type Handler = fn(vector: u8, error_code: u32);

const NO_HANDLER: Option<Handler> = None;
static HANDLERS: Mutex<[Option<Handler>; 256]> = Mutex::new([NO_HANDLER; 256]);

/// Registers `handler` for `vector`, replacing whatever was there before.
/// Mirrors `register_interrupt_handler`.
pub fn register(vector: u8, handler: Handler) {
    HANDLERS.lock()[vector as usize] = Some(handler);
}

/// Clears whatever handler was registered for `vector`.
/// Mirrors `unregister_interrupt_handler`.
pub fn unregister(vector: u8) {
    HANDLERS.lock()[vector as usize] = None;
}

/// Looks up the currently registered handler for `vector`, if any.
pub fn get(vector: u8) -> Option<Handler> {
    HANDLERS.lock()[vector as usize]
}

/// Maps `irq_id` to its vector (per [`pic::to_vector`]) and registers
/// `handler` there. IRQ-level convenience over [`register`].
pub fn register_irq(irq_id: IrqId, handler: Handler) {
    register(pic::to_vector(irq_id), handler);
}

/// Builds all 256 gates pointing at the generated stubs and loads the IDT
/// with `lidt`. Must run after the GDT is installed (the gate's selector is
/// read from `cs`).
pub fn init() {
    unsafe {
        let kernel_selector: u16;
        asm!("mov {0:x}, cs", out(reg) kernel_selector, options(nomem, nostack, preserves_flags));

        let idt = &mut *core::ptr::addr_of_mut!(IDT);
        for (vector, entry) in idt.iter_mut().enumerate() {
            entry.set(ISR_STUBS[vector], kernel_selector, GATE_INTERRUPT_32);
        }

        let descriptor = &mut *core::ptr::addr_of_mut!(IDT_DESCRIPTOR);
        descriptor.limit = (size_of::<[IdtEntry; 256]>() - 1) as u16;
        descriptor.base = core::ptr::addr_of!(IDT) as u32;

        asm!("lidt [{}]", in(reg) core::ptr::addr_of!(IDT_DESCRIPTOR), options(nostack, preserves_flags));
    }
}

/// Reads back the currently loaded IDT pointer via `sidt`, for diagnostics.
pub fn current_pointer() -> (u16, u32) {
    let mut readback = [0u8; 6];
    unsafe {
        asm!("sidt [{}]", in(reg) &mut readback, options(nostack, preserves_flags));
    }
    let limit = u16::from_le_bytes([readback[0], readback[1]]);
    let base = u32::from_le_bytes([readback[2], readback[3], readback[4], readback[5]]);
    (limit, base)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_vector: u8, _error_code: u32) {}

    #[test]
    fn register_then_get_round_trips() {
        register(200, noop);
        assert!(get(200).is_some());
        unregister(200);
        assert!(get(200).is_none());
    }

    #[test]
    fn unregistered_vector_is_none() {
        assert!(get(201).is_none());
    }

    #[test]
    fn register_irq_maps_through_pic_vector() {
        register_irq(IrqId::PicSlave(0), noop);
        assert!(get(0x48).is_some());
        unregister(0x48);
        assert!(get(0x48).is_none());
    }
}
