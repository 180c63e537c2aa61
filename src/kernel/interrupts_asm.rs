//! Common interrupt trampoline plus the 256 generated per-vector stubs.
//!
//! Each generated stub (`isr_stub_N`, see `build.rs`) pushes a dummy error
//! code unless the CPU already pushed a real one, pushes the vector number,
//! then falls through here. `isr_common_stub` saves the 32-bit general
//! registers with `pusha`, hands a pointer to the resulting frame to
//! [`super::interrupts::isr_dispatch`], then unwinds and `iretd`s.

use core::arch::global_asm;

global_asm!(
    r#"
.intel_syntax noprefix

.extern isr_dispatch

.globl isr_common_stub
isr_common_stub:
    pusha
    mov eax, esp
    push eax
    call isr_dispatch
    add esp, 4
    popa
    add esp, 8
    iretd

.att_syntax prefix
"#
);

global_asm!(include_str!(concat!(env!("OUT_DIR"), "/isr_stubs.s")));

include!(concat!(env!("OUT_DIR"), "/isr_stubs.rs"));
