//! Core errors, configuration, and constants for `shmcache`.
//!
//! ## Key Components
//!
//! - **`errors`**: Defines the primary `Error` enum and `Result` type alias used
//!   by everything that touches the shared lock table outside the lock hot path.
//! - **`config`**: `LockTableConfig`, its builder, and environment overrides.
//! - **`constants`**: Shared constants such as environment variable names and
//!   the on-disk table format markers.

pub mod config;
pub mod constants;
pub mod errors;

pub use self::{
    config::{LockTableConfig, LockTableConfigBuilder},
    constants::*,
    errors::{Error, Result},
};
