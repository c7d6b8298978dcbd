//! Fatal checks for lock misuse
//!
//! Releasing a lock that is not held, or entering a sub-state without its
//! parent lock, means some process has already broken the slot's invariant.
//! Other processes may be relying on that invariant, so we stop here.

use std::sync::atomic::{AtomicBool, Ordering};

/// Panic unless `condition` holds
#[inline]
#[track_caller]
pub(crate) fn require(condition: bool, operation: &'static str, requirement: &'static str) {
    if !condition {
        violated(operation, requirement);
    }
}

/// Panic unless `flag` is set
///
/// The flag is left set either way. A set flag keeps other processes away
/// from the broken entry.
#[inline]
#[track_caller]
pub(crate) fn require_flag_set(flag: &AtomicBool, operation: &'static str) {
    if !flag.swap(true, Ordering::Relaxed) {
        violated(operation, "headers lock must be held");
    }
}

#[cold]
#[inline(never)]
#[track_caller]
fn violated(operation: &'static str, requirement: &'static str) -> ! {
    tracing::error!(operation, requirement, "entry lock misuse");
    panic!("entry lock misuse in {operation}: {requirement}");
}
