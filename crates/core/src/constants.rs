/// Constants used throughout the shmcache codebase
// Environment variable names
pub const SHMCACHE_TABLE_PATH_VAR: &str = "SHMCACHE_TABLE_PATH";
pub const SHMCACHE_SLOTS_VAR: &str = "SHMCACHE_SLOTS";

// Default table location, relative to the system temp directory
pub const DEFAULT_TABLE_FILENAME: &str = "shmcache.locks";

// Slot population limits
pub const DEFAULT_SLOTS: u32 = 4096;
pub const MAX_SLOTS: u32 = 1 << 24;

// Lock table file format
pub const TABLE_MAGIC: [u8; 8] = *b"SHMCLOCK";
pub const TABLE_FORMAT_VERSION: u32 = 1;
