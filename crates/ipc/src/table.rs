//! File-backed lock table shared by every worker
//!
//! The table is a header followed by an array of [`EntryLock`] slots in a
//! file mapped with `MAP_SHARED`. Every process (or thread) that maps the
//! same file sees and mutates the same locks. Creating a table always starts
//! from zeroed slots: locks do not survive a restart.
//!
//! ```text
//! offset 0   magic "SHMCLOCK"          8 bytes
//!        8   format version (le u32)   4 bytes
//!       12   slot count     (le u32)   4 bytes
//!       16   slot size      (le u32)   4 bytes
//!       20   reserved                 44 bytes
//!       64   slot 0, slot 1, ...      16 bytes each
//! ```

use crate::read_write_lock::EntryLock;
use crate::stats::LockStats;
use memmap2::MmapMut;
use shmcache_core::{Error, LockTableConfig, Result, TABLE_FORMAT_VERSION, TABLE_MAGIC};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use tracing::{debug, info, warn};

/// Size of the header; also the offset of the first slot
pub const HEADER_SIZE: usize = 64;

const SLOT_SIZE: usize = std::mem::size_of::<EntryLock>();

const _: () = assert!(HEADER_SIZE % std::mem::align_of::<EntryLock>() == 0);

/// Decoded table header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableHeader {
    pub version: u32,
    pub slot_count: u32,
    pub slot_size: u32,
}

impl TableHeader {
    fn new(slot_count: u32) -> Self {
        Self {
            version: TABLE_FORMAT_VERSION,
            slot_count,
            slot_size: SLOT_SIZE as u32,
        }
    }

    fn encode(&self, buf: &mut [u8]) {
        buf[..HEADER_SIZE].fill(0);
        buf[0..8].copy_from_slice(&TABLE_MAGIC);
        buf[8..12].copy_from_slice(&self.version.to_le_bytes());
        buf[12..16].copy_from_slice(&self.slot_count.to_le_bytes());
        buf[16..20].copy_from_slice(&self.slot_size.to_le_bytes());
    }

    fn decode(buf: &[u8], path: &Path) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(Error::corrupted(path, "file is shorter than the table header"));
        }
        if buf[0..8] != TABLE_MAGIC {
            return Err(Error::corrupted(path, "bad magic"));
        }

        let header = Self {
            version: read_u32(buf, 8),
            slot_count: read_u32(buf, 12),
            slot_size: read_u32(buf, 16),
        };

        if header.version != TABLE_FORMAT_VERSION {
            return Err(Error::version_mismatch(TABLE_FORMAT_VERSION, header.version));
        }
        if header.slot_size as usize != SLOT_SIZE {
            return Err(Error::corrupted(
                path,
                format!(
                    "slot size is {} bytes, expected {SLOT_SIZE}",
                    header.slot_size
                ),
            ));
        }
        Ok(header)
    }

    fn file_len(&self) -> usize {
        HEADER_SIZE + self.slot_count as usize * SLOT_SIZE
    }
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    let mut out = [0u8; 4];
    out.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_le_bytes(out)
}

/// Shared array of entry locks backed by a mapped file
pub struct LockTable {
    path: PathBuf,
    header: TableHeader,
    slots: NonNull<EntryLock>,
    // keeps the mapping alive; `slots` points into it
    mmap: MmapMut,
    _file: File,
}

// SAFETY: the slots are only reachable as `&EntryLock`, which is Sync, and
// the mapping lives as long as the table.
unsafe impl Send for LockTable {}
unsafe impl Sync for LockTable {}

impl LockTable {
    /// Create (or recreate) a table with every slot idle
    ///
    /// No worker may hold a lock in the table while it is recreated: every
    /// slot is zeroed, held locks included. A file that already has this
    /// table's layout is reset in place and never shrunk, so mappings still
    /// attached to it stay valid. Any other file is truncated and resized,
    /// which invalidates existing mappings of it.
    pub fn create(config: &LockTableConfig) -> Result<Self> {
        config.validate()?;
        let path = config.path.clone();
        let header = TableHeader::new(config.slots);

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| Error::io(&path, "create lock table", e))?;

        let actual_len = file
            .metadata()
            .map_err(|e| Error::io(&path, "stat lock table", e))?
            .len();
        let reusable = actual_len == header.file_len() as u64 && Self::has_layout(&file, &header);

        if !reusable {
            // a freshly extended file reads as zeros, i.e. idle locks
            file.set_len(0)
                .and_then(|()| file.set_len(header.file_len() as u64))
                .map_err(|e| Error::io(&path, "size lock table", e))?;
        }

        // SAFETY: the file is only ever modified through mappings of this
        // layout; the slots are atomics and tolerate concurrent mutation.
        let mut mmap = unsafe { MmapMut::map_mut(&file) }
            .map_err(|e| Error::io(&path, "map lock table", e))?;
        header.encode(&mut mmap);
        mmap.flush()
            .map_err(|e| Error::io(&path, "flush lock table header", e))?;

        let table = Self::from_parts(path, header, mmap, file)?;
        if reusable {
            let busy = table.busy().count();
            if busy > 0 {
                warn!(path = %table.path.display(), busy, "resetting busy slots of existing lock table");
            }
            table.iter().for_each(EntryLock::reset);
        }

        info!(path = %table.path.display(), slots = header.slot_count, reused = reusable, "created lock table");
        Ok(table)
    }

    /// Whether `file` already holds a table header matching `expected`
    fn has_layout(file: &File, expected: &TableHeader) -> bool {
        // SAFETY: see `create`; this mapping is only read.
        let Ok(mmap) = (unsafe { memmap2::Mmap::map(file) }) else {
            return false;
        };
        matches!(TableHeader::decode(&mmap, Path::new("")), Ok(header) if header == *expected)
    }

    /// Attach to an existing table
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| Error::io(&path, "open lock table", e))?;

        let actual_len = file
            .metadata()
            .map_err(|e| Error::io(&path, "stat lock table", e))?
            .len();
        if actual_len < HEADER_SIZE as u64 {
            return Err(Error::corrupted(&path, "file is shorter than the table header"));
        }

        // SAFETY: see `create`.
        let mmap = unsafe { MmapMut::map_mut(&file) }
            .map_err(|e| Error::io(&path, "map lock table", e))?;
        let header = TableHeader::decode(&mmap, &path)?;
        if mmap.len() < header.file_len() {
            return Err(Error::corrupted(
                &path,
                format!(
                    "{} slots need {} bytes, file has {}",
                    header.slot_count,
                    header.file_len(),
                    mmap.len()
                ),
            ));
        }

        info!(path = %path.display(), slots = header.slot_count, "attached to lock table");
        Self::from_parts(path, header, mmap, file)
    }

    fn from_parts(path: PathBuf, header: TableHeader, mut mmap: MmapMut, file: File) -> Result<Self> {
        // SAFETY: the mapping is page aligned and at least `file_len()` long,
        // so the slot array starts in bounds at an offset aligned for EntryLock.
        let base = unsafe { mmap.as_mut_ptr().add(HEADER_SIZE) }.cast::<EntryLock>();
        let slots = NonNull::new(base)
            .ok_or_else(|| Error::corrupted(&path, "mapping returned a null address"))?;
        Ok(Self {
            path,
            header,
            slots,
            mmap,
            _file: file,
        })
    }

    /// Backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> TableHeader {
        self.header
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.header.slot_count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The lock in slot `index`, if there is such a slot
    pub fn slot(&self, index: usize) -> Option<&EntryLock> {
        if index >= self.len() {
            return None;
        }
        // SAFETY: in bounds per the check above; all bit patterns of the
        // slot's atomics are valid.
        Some(unsafe { &*self.slots.as_ptr().add(index) })
    }

    /// All locks in slot order
    pub fn iter(&self) -> impl Iterator<Item = &EntryLock> + '_ {
        (0..self.len()).filter_map(move |index| self.slot(index))
    }

    /// Slots somebody reads or writes, with their indices
    pub fn busy(&self) -> impl Iterator<Item = (usize, &EntryLock)> + '_ {
        self.iter()
            .enumerate()
            .filter(|(_, lock)| !lock.snapshot().is_idle())
    }

    /// Return one slot's lock to idle for reuse by a new entry
    ///
    /// Returns `false` for an out-of-range index. The caller must own the
    /// slot: nobody else may be using its lock.
    pub fn reset_slot(&self, index: usize) -> bool {
        match self.slot(index) {
            Some(lock) => {
                debug!(index, state = %lock, "recycling lock slot");
                lock.reset();
                true
            }
            None => false,
        }
    }

    /// Best-effort statistics over every slot
    pub fn stats(&self) -> LockStats {
        LockStats::collect(self.iter())
    }

    /// Write the mapping back to the file
    pub fn flush(&self) -> Result<()> {
        self.mmap
            .flush()
            .map_err(|e| Error::io(&self.path, "flush lock table", e))
    }
}

impl std::fmt::Debug for LockTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockTable")
            .field("path", &self.path)
            .field("header", &self.header)
            .finish()
    }
}
