//! Flat-model 32-bit GDT: null, ring-0 code, ring-0 data. No TSS, no user
//! mode descriptors — this kernel never leaves ring 0.

use core::arch::asm;
use core::mem::size_of;

const GDT_PRESENT: u8 = 1 << 7;
const GDT_SEGMENT: u8 = 1 << 4; // descriptor type: code/data, not a system segment
const GDT_EXECUTABLE: u8 = 1 << 3;
const GDT_READABLE: u8 = 1 << 1; // readable (code) / writable (data)
const GDT_RING_3: u8 = 0b0110_0000;

pub const CODE_SELECTOR: u16 = 0x08;
pub const DATA_SELECTOR: u16 = 0x10;

#[repr(C, packed)]
#[derive(Clone, Copy)]
struct GdtEntry {
    limit_low: u16,
    base_low: u16,
    base_mid: u8,
    access: u8,
    limit_high_flags: u8,
    base_high: u8,
}

impl GdtEntry {
    const fn null() -> Self {
        GdtEntry {
            limit_low: 0,
            base_low: 0,
            base_mid: 0,
            access: 0,
            limit_high_flags: 0,
            base_high: 0,
        }
    }
}

#[repr(C, packed)]
struct GdtPointer {
    limit: u16,
    base: u32,
}

static mut GDT: [GdtEntry; 3] = [GdtEntry::null(); 3];

fn access_byte(executable: bool, readable_writable: bool, dpl: u8) -> u8 {
    let mut flags = GDT_PRESENT;
    flags |= (dpl << 5) & GDT_RING_3;
    flags |= GDT_SEGMENT;
    if executable {
        flags |= GDT_EXECUTABLE;
    }
    if readable_writable {
        flags |= GDT_READABLE;
    }
    flags
}

fn set_descriptor(entry: &mut GdtEntry, base: u32, limit: u32, access: u8, flags: u8) {
    entry.base_low = (base & 0xFFFF) as u16;
    entry.base_mid = ((base >> 16) & 0xFF) as u8;
    entry.base_high = ((base >> 24) & 0xFF) as u8;

    entry.limit_low = (limit & 0xFFFF) as u16;
    entry.limit_high_flags = ((limit >> 16) & 0x0F) as u8 | (flags & 0xF0);

    entry.access = access;
}

/// Builds the three flat descriptors and loads the GDT via `lgdt`, then
/// reloads every segment register (far jump for CS, movs for the rest).
pub fn init() {
    unsafe {
        let gdt = &raw mut GDT;

        (*gdt)[0] = GdtEntry::null();

        let code_access = access_byte(true, true, 0);
        set_descriptor(&mut (*gdt)[1], 0, 0xFFFFF, code_access, 0xC0);

        let data_access = access_byte(false, true, 0);
        set_descriptor(&mut (*gdt)[2], 0, 0xFFFFF, data_access, 0xC0);

        let pointer = GdtPointer {
            limit: (size_of::<[GdtEntry; 3]>() - 1) as u16,
            base: gdt as u32,
        };

        asm!(
            "lgdt [{ptr}]",
            "ljmp {cs}, 2f",
            "2:",
            "mov ax, {ds}",
            "mov ds, ax",
            "mov es, ax",
            "mov fs, ax",
            "mov gs, ax",
            "mov ss, ax",
            ptr = in(reg) &pointer,
            cs = const CODE_SELECTOR,
            ds = const DATA_SELECTOR,
            out("ax") _,
            options(nostack, preserves_flags),
        );
    }
}

/// Reads back the currently loaded GDTR via `sgdt`, for diagnostics.
pub fn current_pointer() -> (u16, u32) {
    let mut pointer = GdtPointer { limit: 0, base: 0 };
    unsafe {
        asm!("sgdt [{0}]", in(reg) &mut pointer, options(nostack));
    }
    (pointer.limit, pointer.base)
}
