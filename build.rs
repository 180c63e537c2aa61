//! Generates the 256 per-vector interrupt trampolines.
//!
//! Every vector needs its own tiny stub (the vector number is an immediate
//! baked into the stub, not something the CPU hands the handler), so rather
//! than hand-writing 256 nearly-identical `global_asm!` blocks this writes
//! one generated assembly file plus the matching `extern "C"` declarations
//! and lookup table, included from `src/kernel/interrupts_asm.rs` and
//! `src/kernel/idt.rs` respectively.

use std::env;
use std::fs;
use std::path::Path;

// x86 exceptions for which the CPU itself pushes an error code before
// entering the handler.
const ERROR_CODE_VECTORS: [u32; 10] = [8, 10, 11, 12, 13, 14, 17, 21, 29, 30];

fn main() {
    let out_dir = env::var("OUT_DIR").expect("OUT_DIR set by cargo");

    let mut asm = String::new();
    asm.push_str(".intel_syntax noprefix\n");
    for v in 0..256u32 {
        asm.push_str(&format!(".global isr_stub_{v}\n"));
        asm.push_str(&format!("isr_stub_{v}:\n"));
        if !ERROR_CODE_VECTORS.contains(&v) {
            asm.push_str("    push 0\n");
        }
        asm.push_str(&format!("    push {v}\n"));
        asm.push_str("    jmp isr_common_stub\n");
    }
    fs::write(Path::new(&out_dir).join("isr_stubs.s"), asm).expect("write isr_stubs.s");

    let mut rs = String::new();
    rs.push_str("unsafe extern \"C\" {\n");
    for v in 0..256u32 {
        rs.push_str(&format!("    pub fn isr_stub_{v}();\n"));
    }
    rs.push_str("}\n\n");
    rs.push_str("pub static ISR_STUBS: [unsafe extern \"C\" fn(); 256] = [\n");
    for v in 0..256u32 {
        rs.push_str(&format!("    isr_stub_{v},\n"));
    }
    rs.push_str("];\n");
    fs::write(Path::new(&out_dir).join("isr_stubs.rs"), rs).expect("write isr_stubs.rs");

    println!("cargo:rerun-if-changed=build.rs");
}
