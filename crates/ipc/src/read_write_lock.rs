//! Non-blocking reader/writer lock for cache slots shared between processes
//!
//! An [`EntryLock`] is plain fixed-layout data: three `u32` counters and
//! three boolean flags, with no pointers. It lives inside each slot of a
//! region mapped into every worker, and an all-zero slot is an idle lock.
//!
//! Every acquisition is a single attempt. It either succeeds or undoes its
//! own fence update and reports `false`; retrying is the caller's business.
//!
//! Two fence counters make racing attempts visible to each other:
//!
//! - `read_level` counts readers that hold or are acquiring the shared lock.
//!   A reader bumps it *before* looking for writers, so a writer deciding
//!   its fate always sees the reader coming.
//! - `write_level` counts writers that hold or are attempting the exclusive
//!   lock. Only the attempt that moves it from zero to one may finalize.
//!
//! All counter updates are sequentially consistent: the reader's
//! "bump read_level, then load write_level" and the writer's
//! "bump write_level, then load read_level" must not be reordered, or both
//! sides could miss each other.

use crate::misuse::{require, require_flag_set};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

const ORDER: Ordering = Ordering::SeqCst;

/// Reader/writer lock embedded in a shared cache slot
#[repr(C)]
#[derive(Debug, Default)]
pub struct EntryLock {
    /// Readers holding or acquiring the shared lock; keeps new writers out
    read_level: AtomicU32,
    /// Writers holding or attempting the exclusive lock; keeps new readers out
    write_level: AtomicU32,
    /// Readers actually holding the shared lock
    readers: AtomicU32,
    /// The exclusive lock is held
    writing: AtomicBool,
    /// The exclusive holder lets new readers attach
    appending: AtomicBool,
    /// Somebody holds the headers lock
    updating: AtomicBool,
}

// Slot arrays are laid out by every process independently.
const _: () = assert!(std::mem::size_of::<EntryLock>() == 16);
const _: () = assert!(std::mem::align_of::<EntryLock>() == 4);

impl EntryLock {
    /// An idle lock
    pub const fn new() -> Self {
        Self {
            read_level: AtomicU32::new(0),
            write_level: AtomicU32::new(0),
            readers: AtomicU32::new(0),
            writing: AtomicBool::new(false),
            appending: AtomicBool::new(false),
            updating: AtomicBool::new(false),
        }
    }

    /// Return the lock to the idle state in place
    ///
    /// Only for the owner recycling the slot: nobody else may be using the
    /// lock while it is reset.
    pub fn reset(&self) {
        self.read_level.store(0, ORDER);
        self.write_level.store(0, ORDER);
        self.readers.store(0, ORDER);
        self.writing.store(false, ORDER);
        self.appending.store(false, ORDER);
        self.updating.store(false, ORDER);
    }

    /// Try to acquire the shared lock
    #[must_use]
    pub fn lock_shared(&self) -> bool {
        self.read_level.fetch_add(1, ORDER); // locks "new" writers out
        if self.write_level.load(ORDER) == 0 || self.appending.load(ORDER) {
            self.readers.fetch_add(1, ORDER);
            return true;
        }
        self.read_level.fetch_sub(1, ORDER);
        false
    }

    /// Release a shared lock acquired earlier
    ///
    /// # Panics
    ///
    /// If no shared lock is held.
    #[track_caller]
    pub fn unlock_shared(&self) {
        require(
            self.readers.load(ORDER) > 0,
            "unlock_shared",
            "a shared lock must be held",
        );
        self.readers.fetch_sub(1, ORDER);
        self.read_level.fetch_sub(1, ORDER);
    }

    /// Try to acquire the exclusive lock
    #[must_use]
    pub fn lock_exclusive(&self) -> bool {
        if self.write_level.fetch_add(1, ORDER) == 0 {
            // first writer; "new" readers are locked out from here on
            return self.finalize_exclusive();
        }
        self.write_level.fetch_sub(1, ORDER);
        false
    }

    /// Release the exclusive lock, ending any appending
    ///
    /// # Panics
    ///
    /// If the exclusive lock is not held.
    #[track_caller]
    pub fn unlock_exclusive(&self) {
        require(
            self.writing.load(ORDER),
            "unlock_exclusive",
            "the exclusive lock must be held",
        );
        self.appending.store(false, ORDER);
        self.writing.store(false, ORDER);
        self.write_level.fetch_sub(1, ORDER);
    }

    /// Try to acquire the headers lock: a shared lock plus the single
    /// `updating` permit
    #[must_use]
    pub fn lock_headers(&self) -> bool {
        if self.lock_shared() {
            if !self.updating.swap(true, Ordering::Acquire) {
                return true;
            }
            // somebody else is updating
            self.unlock_shared();
        }
        false
    }

    /// Release the headers lock
    ///
    /// # Panics
    ///
    /// If the headers lock is not held.
    #[track_caller]
    pub fn unlock_headers(&self) {
        require_flag_set(&self.updating, "unlock_headers");
        self.updating.store(false, Ordering::Release);
        self.unlock_shared();
    }

    /// Trade a held shared lock for the exclusive lock
    ///
    /// On failure the caller holds no lock at all: the shared lock is gone,
    /// not restored.
    ///
    /// # Panics
    ///
    /// If no shared lock is held.
    #[track_caller]
    #[must_use]
    pub fn unlock_shared_and_switch_to_exclusive(&self) -> bool {
        require(
            self.readers.load(ORDER) > 0,
            "unlock_shared_and_switch_to_exclusive",
            "a shared lock must be held",
        );
        if self.write_level.fetch_add(1, ORDER) == 0 {
            self.unlock_shared();
            return self.finalize_exclusive();
        }

        // somebody else is writing or about to; just stop reading
        self.unlock_shared();
        self.write_level.fetch_sub(1, ORDER);
        false
    }

    /// Trade the exclusive lock for a shared lock without ever leaving the
    /// entry unlocked
    ///
    /// # Panics
    ///
    /// If the exclusive lock is not held.
    #[track_caller]
    pub fn switch_exclusive_to_shared(&self) {
        require(
            self.writing.load(ORDER),
            "switch_exclusive_to_shared",
            "the exclusive lock must be held",
        );
        // must happen before exclusive control is released
        self.read_level.fetch_add(1, ORDER);
        self.readers.fetch_add(1, ORDER);
        self.unlock_exclusive();
    }

    /// Let new readers share the entry while we keep writing it
    ///
    /// # Panics
    ///
    /// If the exclusive lock is not held.
    #[track_caller]
    pub fn start_appending(&self) {
        require(
            self.writing.load(ORDER),
            "start_appending",
            "the exclusive lock must be held",
        );
        self.appending.store(true, ORDER);
    }

    /// Stop admitting new readers
    ///
    /// Returns whether the writer is alone again. `false` means some reader
    /// holds or may be acquiring the shared lock, and the writer must not
    /// assume exclusive access to bytes it already exposed.
    ///
    /// # Panics
    ///
    /// If the caller is not an appending exclusive holder.
    #[track_caller]
    #[must_use]
    pub fn stop_appending_and_restore_exclusive(&self) -> bool {
        require(
            self.writing.load(ORDER),
            "stop_appending_and_restore_exclusive",
            "the exclusive lock must be held",
        );
        require(
            self.appending.load(ORDER),
            "stop_appending_and_restore_exclusive",
            "appending must be in progress",
        );

        self.appending.store(false, ORDER);

        // `readers` would miss a lock_shared() that saw `appending` before we
        // cleared it but has not counted itself yet. `read_level` may still
        // include a lock_shared() that is about to back off. A spurious
        // "false" is harmless; a spurious "true" is not.
        self.read_level.load(ORDER) == 0
    }

    /// Number of readers holding the shared lock
    pub fn readers(&self) -> u32 {
        self.readers.load(Ordering::Relaxed)
    }

    /// Whether the exclusive lock is held
    pub fn is_writing(&self) -> bool {
        self.writing.load(Ordering::Relaxed)
    }

    /// Whether the exclusive holder is admitting readers
    pub fn is_appending(&self) -> bool {
        self.appending.load(Ordering::Relaxed)
    }

    /// Best-effort view of the observable state
    ///
    /// Fields are loaded one at a time, so a lock in mid-transition may
    /// produce a combination that never existed.
    pub fn snapshot(&self) -> LockSnapshot {
        LockSnapshot {
            readers: self.readers(),
            writing: self.is_writing(),
            appending: self.is_appending(),
        }
    }

    /// Shared tail of lock_exclusive() and the upgrade path
    ///
    /// The caller must have been the one to move `write_level` off zero.
    /// Backs `write_level` out again on failure.
    fn finalize_exclusive(&self) -> bool {
        require(
            self.write_level.load(ORDER) > 0,
            "finalize_exclusive",
            "new readers must be locked out",
        );
        require(
            !self.appending.load(ORDER),
            "finalize_exclusive",
            "nobody may be appending without the exclusive lock",
        );
        if self.read_level.load(ORDER) == 0 {
            // no old readers and nobody is becoming one
            self.writing.store(true, ORDER);
            return true;
        }
        self.write_level.fetch_sub(1, ORDER);
        false
    }
}

// `updating` is left out: reading it honestly would mean taking it.
impl fmt::Display for EntryLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.snapshot().fmt(f)
    }
}

/// Observable state of one [`EntryLock`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LockSnapshot {
    pub readers: u32,
    pub writing: bool,
    pub appending: bool,
}

impl LockSnapshot {
    /// Nobody reads or writes the entry
    pub fn is_idle(&self) -> bool {
        self.readers == 0 && !self.writing
    }
}

impl fmt::Display for LockSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}R{}{}",
            self.readers,
            if self.writing { "W" } else { "" },
            if self.appending { "A" } else { "" }
        )
    }
}
