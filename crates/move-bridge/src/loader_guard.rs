//! # Loader Cache Guard
//!
//! Remembers whether any call in the current transaction linked new bytecode
//! into a pooled engine's loader cache. The post-transaction hook consumes
//! the flag: if the transaction failed, every cached module is invalidated,
//! since the publish that warmed the cache was rolled back from the store.

use crate::pool::EnginePool;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

/// Per-transaction "new modules loaded" flag.
#[derive(Debug, Default)]
pub struct LoaderCacheGuard {
    loaded_new_modules: AtomicBool,
}

impl LoaderCacheGuard {
    /// Creates a cleared guard.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a call's outcome. Only ever sets the flag.
    pub fn record(&self, loaded_new_modules: bool) {
        if loaded_new_modules {
            self.loaded_new_modules.store(true, Ordering::Release);
        }
    }

    /// Returns true if the flag is set.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.loaded_new_modules.load(Ordering::Acquire)
    }

    /// Reads and clears the flag.
    pub fn take(&self) -> bool {
        self.loaded_new_modules.swap(false, Ordering::AcqRel)
    }

    /// Post-transaction hook. Clears the flag unconditionally and invalidates
    /// the pool's loader caches when a failed transaction had loaded code.
    /// Returns true if caches were invalidated.
    pub fn post_transaction(&self, success: bool, pool: &EnginePool) -> bool {
        let loaded = self.take();
        if loaded && !success {
            info!("Failed transaction loaded new modules, invalidating loader caches");
            pool.invalidate_loader_caches();
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ScriptedEngineFactory;

    #[test]
    fn test_record_only_sets() {
        let guard = LoaderCacheGuard::new();
        guard.record(true);
        guard.record(false);
        assert!(guard.is_set());
        assert!(guard.take());
        assert!(!guard.is_set());
    }

    #[test]
    fn test_post_transaction_invalidates_only_on_failure() {
        let pool = EnginePool::new(&ScriptedEngineFactory::new(), 1).unwrap();
        let guard = LoaderCacheGuard::new();

        guard.record(true);
        assert!(!guard.post_transaction(true, &pool));
        assert_eq!(pool.generation(), 0);
        assert!(!guard.is_set());

        guard.record(true);
        assert!(guard.post_transaction(false, &pool));
        assert_eq!(pool.generation(), 1);

        assert!(!guard.post_transaction(false, &pool));
        assert_eq!(pool.generation(), 1);
    }
}
