use clap::{Subcommand, ValueEnum};
use eyre::{bail, WrapErr};
use shmcache_core::{LockTableConfig, LockTableConfigBuilder};
use shmcache_ipc::{EntryLock, LockTable};
use std::path::{Path, PathBuf};

#[derive(Subcommand)]
pub enum Commands {
    /// Create the lock table, resetting every slot to idle
    Create {
        /// Number of slots (overrides SHMCACHE_SLOTS and the config file)
        #[arg(long)]
        slots: Option<u32>,
    },
    /// Print the lock status report
    Stats {
        /// Emit JSON instead of the text report
        #[arg(long)]
        json: bool,
    },
    /// Print the state of each busy slot
    Dump {
        /// Include idle slots
        #[arg(long)]
        all: bool,
    },
    /// Try to take one lock once, then release it
    Probe {
        /// Slot index
        #[arg(long)]
        slot: usize,
        /// Lock mode to try
        #[arg(long, value_enum, default_value = "shared")]
        mode: ProbeMode,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProbeMode {
    Shared,
    Exclusive,
    Headers,
}

/// Defaults, then the config file, then the environment, then flags
pub fn resolve_config(file: Option<&Path>, path: Option<PathBuf>) -> eyre::Result<LockTableConfig> {
    let mut config = match file {
        Some(file) => LockTableConfig::from_file(file)
            .wrap_err_with(|| format!("loading {}", file.display()))?,
        None => LockTableConfig::default(),
    };
    config.apply_env()?;

    let mut builder = LockTableConfigBuilder::from_config(config);
    if let Some(path) = path {
        builder = builder.with_path(path);
    }
    Ok(builder.build()?)
}

impl Commands {
    pub fn execute(self, config: LockTableConfig) -> eyre::Result<()> {
        match self {
            Commands::Create { slots } => {
                let mut builder = LockTableConfigBuilder::from_config(config);
                if let Some(slots) = slots {
                    builder = builder.with_slots(slots);
                }
                let config = builder.build()?;
                let table = LockTable::create(&config)?;
                println!("{} slots at {}", table.len(), table.path().display());
                Ok(())
            }
            Commands::Stats { json } => {
                let table = LockTable::open(&config.path)?;
                let stats = table.stats();
                if json {
                    println!("{}", serde_json::to_string_pretty(&stats)?);
                } else {
                    print!("{stats}");
                }
                Ok(())
            }
            Commands::Dump { all } => {
                let table = LockTable::open(&config.path)?;
                for (index, lock) in table.iter().enumerate() {
                    let snapshot = lock.snapshot();
                    if all || !snapshot.is_idle() {
                        println!("{index:>8} {snapshot}");
                    }
                }
                Ok(())
            }
            Commands::Probe { slot, mode } => {
                let table = LockTable::open(&config.path)?;
                let Some(lock) = table.slot(slot) else {
                    bail!("slot {slot} is out of range (table has {})", table.len());
                };
                let acquired = probe(lock, mode);
                tracing::debug!(slot, ?mode, acquired, "probed lock");
                println!("{}", if acquired { "acquired" } else { "busy" });
                Ok(())
            }
        }
    }
}

fn probe(lock: &EntryLock, mode: ProbeMode) -> bool {
    match mode {
        ProbeMode::Shared => {
            let acquired = lock.lock_shared();
            if acquired {
                lock.unlock_shared();
            }
            acquired
        }
        ProbeMode::Exclusive => {
            let acquired = lock.lock_exclusive();
            if acquired {
                lock.unlock_exclusive();
            }
            acquired
        }
        ProbeMode::Headers => {
            let acquired = lock.lock_headers();
            if acquired {
                lock.unlock_headers();
            }
            acquired
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_releases_what_it_takes() {
        let lock = EntryLock::new();
        for mode in [ProbeMode::Shared, ProbeMode::Exclusive, ProbeMode::Headers] {
            assert!(probe(&lock, mode));
            assert!(lock.snapshot().is_idle());
        }
    }

    #[test]
    fn test_probe_reports_busy_against_writer() {
        let lock = EntryLock::new();
        assert!(lock.lock_exclusive());
        assert!(!probe(&lock, ProbeMode::Shared));
        assert!(!probe(&lock, ProbeMode::Headers));
        assert!(!probe(&lock, ProbeMode::Exclusive));
        assert_eq!(lock.to_string(), "0RW");
    }
}
