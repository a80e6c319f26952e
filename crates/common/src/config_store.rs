//! Versioned peripheral configuration store
//!
//! The store holds one immutable [`PeripheralConfig`] behind an `Arc` and
//! swaps it as a whole. Readers take a snapshot at the start of an operation
//! and keep using it even if the configuration is replaced meanwhile.

use protocol::PeripheralConfig;
use std::sync::{Arc, RwLock};
use tracing::info;

/// A configuration record together with the version it was published as
#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    /// Starts at 1 and increases with every replace
    pub version: u64,
    pub config: Arc<PeripheralConfig>,
}

/// Process-wide holder of the current peripheral configuration
#[derive(Debug)]
pub struct ConfigStore {
    current: RwLock<ConfigSnapshot>,
}

impl ConfigStore {
    pub fn new(initial: PeripheralConfig) -> Self {
        Self {
            current: RwLock::new(ConfigSnapshot {
                version: 1,
                config: Arc::new(initial),
            }),
        }
    }

    /// Snapshot of the current configuration
    pub fn get(&self) -> ConfigSnapshot {
        // A poisoned lock still guards a complete record: writers only swap.
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Replace the whole configuration, returning the new version
    pub fn replace(&self, new: PeripheralConfig) -> u64 {
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let version = guard.version + 1;
        *guard = ConfigSnapshot {
            version,
            config: Arc::new(new),
        };

        info!("Peripheral configuration updated (version {})", version);
        version
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new(PeripheralConfig::default())
    }
}
