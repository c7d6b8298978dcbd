//! Best-effort lock population statistics
//!
//! Scanning takes no locks. A slot that changes state while it is being
//! looked at may be classified by its old or its new state, or by a mix of
//! the two, so totals can be off by one per busy slot. The numbers feed
//! status reports, never decisions.

use crate::read_write_lock::{EntryLock, LockSnapshot};
use serde::Serialize;
use std::fmt;

/// Aggregated state of a set of entry locks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LockStats {
    /// Locks looked at
    pub count: u64,
    /// Locks with at least one reader
    pub readable: u64,
    /// Locks held exclusively (and not counted as readable)
    pub writeable: u64,
    /// Locks nobody holds
    pub idle: u64,
    /// Readers across all readable locks
    pub readers: u64,
    /// Exclusive holders across all writeable locks
    pub writers: u64,
    /// Writers that admit readers while appending
    pub appenders: u64,
}

impl LockStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify one lock and add it to the totals
    pub fn update(&mut self, lock: &EntryLock) {
        self.record(lock.snapshot());
    }

    /// Add an already-taken snapshot to the totals
    pub fn record(&mut self, snapshot: LockSnapshot) {
        if snapshot.readers > 0 {
            self.readable += 1;
            self.readers += u64::from(snapshot.readers);
        } else if snapshot.writing {
            self.writeable += 1;
            self.writers += 1;
            self.appenders += u64::from(snapshot.appending);
        } else {
            self.idle += 1;
        }
        self.count += 1;
    }

    /// Scan a population of locks
    pub fn collect<'a>(locks: impl IntoIterator<Item = &'a EntryLock>) -> Self {
        let mut stats = Self::new();
        for lock in locks {
            stats.update(lock);
        }
        stats
    }

    /// Sum two sets of totals, e.g. from separately scanned regions
    pub fn merge(&mut self, other: &LockStats) {
        self.count += other.count;
        self.readable += other.readable;
        self.writeable += other.writeable;
        self.idle += other.idle;
        self.readers += other.readers;
        self.writers += other.writers;
        self.appenders += other.appenders;
    }

    /// Human-readable status report
    pub fn report(&self) -> String {
        self.to_string()
    }
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        100.0 * part as f64 / whole as f64
    }
}

impl fmt::Display for LockStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Available locks: {:9}", self.count)?;

        if self.count == 0 {
            return Ok(());
        }

        writeln!(
            f,
            "Reading: {:9} {:6.2}%",
            self.readable,
            percent(self.readable, self.count)
        )?;
        writeln!(
            f,
            "Writing: {:9} {:6.2}%",
            self.writeable,
            percent(self.writeable, self.count)
        )?;
        writeln!(
            f,
            "Idle:    {:9} {:6.2}%",
            self.idle,
            percent(self.idle, self.count)
        )?;

        let locked = self.readers + self.writers;
        if locked > 0 {
            writeln!(
                f,
                "Readers:         {:9} {:6.2}%",
                self.readers,
                percent(self.readers, locked)
            )?;
            writeln!(
                f,
                "Writers:         {:9} {:6.2}% including Appenders: {:9} {:6.2}%",
                self.writers,
                percent(self.writers, locked),
                self.appenders,
                percent(self.appenders, self.writers)
            )?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn population() -> Vec<EntryLock> {
        let locks: Vec<EntryLock> = (0..6).map(|_| EntryLock::new()).collect();
        // two readers on one slot, one on another
        assert!(locks[0].lock_shared());
        assert!(locks[0].lock_shared());
        assert!(locks[1].lock_shared());
        // a plain writer and an appending writer
        assert!(locks[2].lock_exclusive());
        assert!(locks[3].lock_exclusive());
        locks[3].start_appending();
        locks
    }

    #[test]
    fn test_classifies_population() {
        let locks = population();
        let stats = LockStats::collect(&locks);

        assert_eq!(
            stats,
            LockStats {
                count: 6,
                readable: 2,
                writeable: 2,
                idle: 2,
                readers: 3,
                writers: 2,
                appenders: 1,
            }
        );
    }

    #[test]
    fn test_appending_writer_with_readers_counts_as_readable() {
        let lock = EntryLock::new();
        assert!(lock.lock_exclusive());
        lock.start_appending();
        assert!(lock.lock_shared());

        let mut stats = LockStats::new();
        stats.update(&lock);
        assert_eq!(stats.readable, 1);
        assert_eq!(stats.readers, 1);
        assert_eq!(stats.writers, 0);
    }

    #[test]
    fn test_scan_does_not_change_locks() {
        let locks = population();
        let before: Vec<_> = locks.iter().map(EntryLock::snapshot).collect();
        let _ = LockStats::collect(&locks);
        let after: Vec<_> = locks.iter().map(EntryLock::snapshot).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_merge_sums_totals() {
        let locks = population();
        let mut total = LockStats::collect(&locks[..3]);
        total.merge(&LockStats::collect(&locks[3..]));
        assert_eq!(total, LockStats::collect(&locks));
    }

    #[test]
    fn test_empty_report_has_only_header() {
        let report = LockStats::new().report();
        assert_eq!(report, "Available locks:         0\n");
    }

    #[test]
    fn test_idle_report_skips_holder_lines() {
        let locks: Vec<EntryLock> = (0..4).map(|_| EntryLock::new()).collect();
        let report = LockStats::collect(&locks).report();
        assert!(report.contains("Idle:            4 100.00%"));
        assert!(!report.contains("Readers:"));
        assert!(!report.contains("Writers:"));
    }

    #[test]
    fn test_report_format() {
        let report = LockStats::collect(&population()).report();
        let expected = "\
Available locks:         6
Reading:         2  33.33%
Writing:         2  33.33%
Idle:            2  33.33%
Readers:                 3  60.00%
Writers:                 2  40.00% including Appenders:         1  50.00%
";
        assert_eq!(report, expected);
    }

    #[test]
    fn test_serializes_to_json() {
        let stats = LockStats::collect(&population());
        let json = serde_json::to_value(stats).unwrap();
        assert_eq!(json["readers"], 3);
        assert_eq!(json["appenders"], 1);
    }
}
