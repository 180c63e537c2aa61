#![no_std]
#![no_main]

extern crate alloc;

use alloc::boxed::Box;
use core::arch::{asm, global_asm};

use log::info;

use mb_rtc_kernel::kernel::executor;
use mb_rtc_kernel::kernel::futures::{self, SerialWriteFuture};
use mb_rtc_kernel::kernel::gdt;
use mb_rtc_kernel::kernel::heap;
use mb_rtc_kernel::kernel::idt;
use mb_rtc_kernel::kernel::log_ring;
use mb_rtc_kernel::kernel::multiboot::BootInfo;
use mb_rtc_kernel::kernel::pic;
use mb_rtc_kernel::kernel::port;
use mb_rtc_kernel::kernel::rtc;
use mb_rtc_kernel::kernel::serial::SERIAL_PORT;
use mb_rtc_kernel::kernel::vga::TERMINAL;

const MULTIBOOT1_FLAGS: u32 = 0x0000_0003; // align modules on page boundaries + memory info

// The Multiboot1 header and the 32-bit entry stub. GRUB (or any Multiboot1
// loader) jumps to `_start` with EAX = the Multiboot magic and EBX = the
// physical address of the boot info structure; paging is off and we are in
// flat 32-bit protected mode already, just without our own GDT/IDT/stack.
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

    push ebx
    push eax
    call kmain
    ud2

.att_syntax prefix
"#,
    flags = const MULTIBOOT1_FLAGS,
    stack_size = const 0x10000,
);

unsafe extern "C" {
    /// Linker-provided symbol marking the end of the kernel image; its
    /// *address* (not contents) is the first byte available to the heap.
    static kernel_end: u8;
}

fn current_esp() -> usize {
    let esp: usize;
    unsafe {
        asm!("mov {0}, esp", out(reg) esp, options(nomem, nostack, preserves_flags));
    }
    esp
}

static mut CUSTOM_HANDLER_HITS: u32 = 0;

fn custom_interrupt_handler(_vector: u8, _error_code: u32) {
    unsafe {
        CUSTOM_HANDLER_HITS += 1;
    }
}

/// Entered once from `_start` with the Multiboot registers still in EAX/EBX.
/// Brings up every C2-C9 subsystem in dependency order, runs a short
/// self-test of the dynamic interrupt registry, spawns a couple of demo
/// futures, then hands off to the executor forever.
#[unsafe(no_mangle)]
unsafe extern "C" fn kmain(magic: u32, multiboot_info_ptr: u32) -> ! {
    unsafe {
        SERIAL_PORT.init();
        SERIAL_PORT.write_str("\nbooting mb-rtc-kernel\n");
    }
    log_ring::init();
    TERMINAL.lock().clear();

    info!("multiboot magic=0x{:08x} info=0x{:08x}", magic, multiboot_info_ptr);

    let boot_info = unsafe { BootInfo::from_registers(magic, multiboot_info_ptr) };
    if boot_info.is_none() {
        info!("no valid multiboot info; heap will stay empty");
    }

    gdt::init();
    info!("gdt loaded");

    idt::init();
    info!("idt loaded");

    pic::init();
    pic::remap();
    info!("pic remapped: master=0x{:02x} slave=0x{:02x}", pic::MASTER_VECTOR_BASE, pic::SLAVE_VECTOR_BASE);

    if let Some(info) = boot_info.as_ref() {
        let kernel_end_addr = &raw const kernel_end as usize;
        heap::init(info, kernel_end_addr, current_esp());
        info!("heap initialized");
    }

    if let Some(handle) = port::request_port(0x1234) {
        port::release_port(handle);
    }

    match rtc::init() {
        Ok(()) => info!("rtc driver ready"),
        Err(reason) => info!("rtc init failed: {reason}"),
    }

    // Exercise the dynamic handler registry with a software interrupt before
    // starting the periodic tick source, mirroring the original kernel's
    // smoke test of `register_interrupt_handler`/`int $0x81`.
    idt::register(0x81, custom_interrupt_handler);
    unsafe {
        asm!("int 0x81");
        asm!("int 0x81");
    }
    info!("custom handler observed {} call(s)", unsafe { CUSTOM_HANDLER_HITS });
    idt::unregister(0x81);

    rtc::start_periodic_ticks();
    info!("periodic rtc ticks enabled at 256 Hz");

    executor::init();
    futures::sleep_ticks(256);
    executor::spawn(Box::new(SerialWriteFuture::new(b"async executor is up\n")));

    log_ring::service();
    info!("entering executor run loop");
    log_ring::service();

    executor::run();
}
