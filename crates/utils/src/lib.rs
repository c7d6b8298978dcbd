//! Shared utilities for shmcache
//!
//! Currently this is the tracing setup shared by every binary in the
//! workspace.

pub mod tracing;
