// src/settings.rs

//! Process-wide execution flags.
//!
//! The dry-run flag is a contract: when set, no files are changed and no
//! external process that changes files is run. Every module must honor it.
//! The two exceptions are spelled out where they occur: the post-load
//! reconciliation save and the interrupt-recording flush.

use std::sync::atomic::{AtomicBool, Ordering};

static DRY_RUN: AtomicBool = AtomicBool::new(false);

/// Enable or disable dry-run mode for the rest of the process.
pub fn set_dry_run(value: bool) {
    DRY_RUN.store(value, Ordering::SeqCst);
}

/// Whether dry-run mode is active.
pub fn dry_run() -> bool {
    DRY_RUN.load(Ordering::SeqCst)
}

/// Serializes tests that toggle or observe the process-wide flag.
#[cfg(test)]
pub(crate) fn dry_run_test_lock() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
