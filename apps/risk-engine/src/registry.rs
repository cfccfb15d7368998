//! Versioned holder of the active limit set.

use std::sync::{Arc, RwLock};

use crate::models::LimitSet;

/// Holds the active [`LimitSet`] behind an atomic swap.
///
/// `current()` always returns a fully consistent snapshot; concurrent
/// validations reading mid-reload see either the old set or the new set,
/// never a torn mixture. Validation of a candidate set happens in the caller
/// before `swap` is invoked; a rejected reload never reaches the registry.
#[derive(Debug)]
pub struct LimitRegistry {
    inner: RwLock<(u64, Arc<LimitSet>)>,
}

impl Default for LimitRegistry {
    fn default() -> Self {
        Self::new(LimitSet::default())
    }
}

impl LimitRegistry {
    /// Create a registry with an initial limit set (version 1).
    #[must_use]
    pub fn new(initial: LimitSet) -> Self {
        Self {
            inner: RwLock::new((1, Arc::new(initial))),
        }
    }

    /// The active limit set.
    #[must_use]
    pub fn current(&self) -> Arc<LimitSet> {
        match self.inner.read() {
            Ok(guard) => Arc::clone(&guard.1),
            Err(poisoned) => Arc::clone(&poisoned.into_inner().1),
        }
    }

    /// Version of the active set; incremented on every swap.
    #[must_use]
    pub fn version(&self) -> u64 {
        match self.inner.read() {
            Ok(guard) => guard.0,
            Err(poisoned) => poisoned.into_inner().0,
        }
    }

    /// Atomically replace the active set, returning the previous one.
    pub fn swap(&self, new_set: LimitSet) -> Arc<LimitSet> {
        let mut guard = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let previous = Arc::clone(&guard.1);
        guard.0 += 1;
        guard.1 = Arc::new(new_set);
        previous
    }
}
