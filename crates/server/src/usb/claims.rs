//! Per-peripheral exclusive claims
//!
//! At most one device session may be open per [`PeripheralIdentity`]. A
//! caller takes a [`ClaimGuard`] before opening a session and drops it only
//! after the session is closed and its OS handle released. Other callers for
//! the same identity block until then; different identities never wait on
//! each other.

use protocol::PeripheralIdentity;
use std::collections::HashSet;
use std::sync::{Condvar, Mutex, MutexGuard};
use tracing::trace;

/// Registry of identities that currently have an open session
#[derive(Debug, Default)]
pub struct ClaimRegistry {
    held: Mutex<HashSet<PeripheralIdentity>>,
    released: Condvar,
}

impl ClaimRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until `identity` is free, then hold it
    pub fn acquire(&self, identity: PeripheralIdentity) -> ClaimGuard<'_> {
        let mut held = self.lock();

        while held.contains(&identity) {
            trace!("Waiting for claim on {}", identity);
            held = match self.released.wait(held) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }

        held.insert(identity);
        trace!("Claimed {}", identity);

        ClaimGuard {
            registry: self,
            identity,
        }
    }

    /// Whether a claim on `identity` is currently held
    pub fn is_held(&self, identity: PeripheralIdentity) -> bool {
        self.lock().contains(&identity)
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<PeripheralIdentity>> {
        // The set stays consistent even if a holder panicked
        match self.held.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn release(&self, identity: PeripheralIdentity) {
        self.lock().remove(&identity);
        trace!("Released claim on {}", identity);
        self.released.notify_all();
    }
}

/// Exclusive claim on one identity; released on drop
#[derive(Debug)]
pub struct ClaimGuard<'a> {
    registry: &'a ClaimRegistry,
    identity: PeripheralIdentity,
}

impl ClaimGuard<'_> {
    pub fn identity(&self) -> PeripheralIdentity {
        self.identity
    }
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        self.registry.release(self.identity);
    }
}
