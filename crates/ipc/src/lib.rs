//! Inter-process cache slot locking for shmcache
//!
//! This crate provides the lock that worker processes use to share one
//! memory-mapped cache index without a kernel mutex:
//! - `EntryLock`: a try-once reader/writer lock with upgrade, downgrade,
//!   a headers sub-lock, and an appending mode for streaming writers
//! - `LockStats`: best-effort classification of a lock population
//! - `LockTable`: a file-backed array of lock slots mapped by every worker

mod misuse;
pub mod read_write_lock;
pub mod stats;
pub mod table;

pub use read_write_lock::{EntryLock, LockSnapshot};
pub use stats::LockStats;
pub use table::{LockTable, TableHeader, HEADER_SIZE};
