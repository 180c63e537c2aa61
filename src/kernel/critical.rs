//! Re-entrant interrupt-disable guard.
//!
//! `acquire` disables interrupts unconditionally and bumps a depth counter;
//! `release` only re-enables them on the transition back to zero. This is
//! deliberately *not* safe against a nested interrupt taken while already
//! inside a critical section — `cli` is what rules that out; an
//! implementation must never try to "remember and restore" the prior IF
//! state instead.

use core::sync::atomic::{AtomicU32, Ordering};

static DEPTH: AtomicU32 = AtomicU32::new(0);

#[cfg(not(test))]
#[inline]
unsafe fn disable_interrupts() {
    unsafe {
        core::arch::asm!("cli", options(nostack, nomem, preserves_flags));
    }
}

#[cfg(not(test))]
#[inline]
unsafe fn enable_interrupts() {
    unsafe {
        core::arch::asm!("sti", options(nostack, nomem, preserves_flags));
    }
}

// `cli`/`sti` are privileged instructions; host unit tests run in ring 3
// (or as a regular user process) and would fault on them, so the host-side
// test build only exercises the depth bookkeeping.
#[cfg(test)]
unsafe fn disable_interrupts() {}
#[cfg(test)]
unsafe fn enable_interrupts() {}

/// Disables interrupts and increments the nesting depth.
pub fn acquire() {
    unsafe {
        disable_interrupts();
    }
    DEPTH.fetch_add(1, Ordering::SeqCst);
}

/// Decrements the nesting depth; re-enables interrupts only when it reaches
/// zero.
pub fn release() {
    let previous = DEPTH.fetch_sub(1, Ordering::SeqCst);
    if previous == 1 {
        unsafe {
            enable_interrupts();
        }
    }
}

/// Runs `f` with interrupts disabled, restoring them (if this was the
/// outermost guard) afterwards regardless of how `f` returns.
pub fn with<R>(f: impl FnOnce() -> R) -> R {
    acquire();
    let result = f();
    release();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    // These tests exercise only the depth bookkeeping; on the host target
    // `cli`/`sti` compile but are meaningless outside ring 0, so the
    // assertions are scoped to `DEPTH` rather than actual IF state.

    #[test]
    fn nesting_returns_depth_to_zero() {
        let start = DEPTH.load(Ordering::SeqCst);
        acquire();
        acquire();
        acquire();
        assert_eq!(DEPTH.load(Ordering::SeqCst), start + 3);
        release();
        release();
        release();
        assert_eq!(DEPTH.load(Ordering::SeqCst), start);
    }
}
