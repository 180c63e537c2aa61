//! Library half of the kernel: everything `src/main.rs`'s boot stub and the
//! `tests/` integration tier both need to link against.
//!
//! `no_std`/`no_main` are conditioned on `not(test)` so `cargo test --lib`
//! runs the `#[cfg(test)]` unit tests scattered through `kernel::*` on the
//! host, the way `other_examples/b14527b8_dickhfchan-rustcore__kernel-src-
//! arch-x86_64-mod.rs.rs` and the cell0-os `lib.rs` both gate their
//! bare-metal-only items on `test`/a hosted feature.

#![cfg_attr(not(test), no_std)]
#![cfg_attr(not(test), no_main)]

extern crate alloc;

pub mod kernel;
pub mod panic;

/// The kernel's sole `#[global_allocator]`. Lives here rather than in
/// `main.rs` so the `tests/` integration binaries link against the same
/// first-fit free-list allocator instead of each improvising their own.
#[cfg(not(test))]
#[global_allocator]
static ALLOCATOR: kernel::heap::KernelAllocator = kernel::heap::KernelAllocator;
