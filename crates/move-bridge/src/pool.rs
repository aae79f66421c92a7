//! # Engine Pool
//!
//! A fixed set of equivalent VM engines lent out one call at a time.
//!
//! A counting semaphore bounds how many engines are out; a mutex guards the
//! backing list for the pop/push only and is never held across a VM call.
//! Loader-cache invalidation is generation based: bumping the generation
//! marks every engine stale, and a stale engine is flushed when next lent.

use crate::errors::BridgeError;
use crate::ports::outbound::{EngineFactory, MoveEngine};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

struct PooledEngine {
    engine: Box<dyn MoveEngine>,
    generation: u64,
}

/// Bounded pool of VM engines.
pub struct EnginePool {
    semaphore: Semaphore,
    engines: Mutex<Vec<PooledEngine>>,
    generation: AtomicU64,
    size: usize,
}

impl EnginePool {
    /// Builds a pool of `size` engines from `factory`.
    pub fn new(factory: &dyn EngineFactory, size: usize) -> Result<Self, BridgeError> {
        if size == 0 {
            return Err(BridgeError::Config("engine pool size must be positive".into()));
        }
        let engines = (0..size)
            .map(|_| PooledEngine {
                engine: factory.create(),
                generation: 0,
            })
            .collect();
        Ok(Self {
            semaphore: Semaphore::new(size),
            engines: Mutex::new(engines),
            generation: AtomicU64::new(0),
            size,
        })
    }

    /// Configured pool size.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Engines not currently lent out.
    #[must_use]
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Current loader-cache generation.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Waits for a free engine.
    ///
    /// Blocks while the pool is exhausted. Cancellation or the deadline
    /// unblocks the wait without taking a permit.
    pub async fn acquire(
        &self,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) -> Result<EngineHandle<'_>, BridgeError> {
        let permit = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                return Err(BridgeError::Cancelled("context cancelled while waiting for engine".into()));
            }
            () = wait_until(deadline) => {
                return Err(BridgeError::Cancelled("deadline exceeded while waiting for engine".into()));
            }
            permit = self.semaphore.acquire() => {
                permit.map_err(|_| BridgeError::Cancelled("engine pool closed".into()))?
            }
        };

        let Some(mut pooled) = self.engines.lock().pop() else {
            return Err(BridgeError::Config("engine pool list shorter than its permits".into()));
        };

        let generation = self.generation();
        if pooled.generation != generation {
            debug!(
                from = pooled.generation,
                to = generation,
                "Flushing stale engine loader cache"
            );
            pooled.engine.flush_loader_cache();
            pooled.generation = generation;
        }

        trace!(available = self.available(), "Engine acquired");
        Ok(EngineHandle {
            pool: self,
            engine: Some(pooled),
            _permit: permit,
        })
    }

    /// Marks every engine's loader cache stale, including lent-out engines.
    pub fn invalidate_loader_caches(&self) {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(generation, "Engine loader caches invalidated");
    }

    fn put_back(&self, pooled: PooledEngine) {
        self.engines.lock().push(pooled);
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

// =============================================================================
// ENGINE HANDLE
// =============================================================================

/// An engine on loan from the pool.
///
/// Dropping the handle returns the engine to the backing list first and
/// releases the permit after, so a freed permit always finds an engine.
pub struct EngineHandle<'a> {
    pool: &'a EnginePool,
    engine: Option<PooledEngine>,
    _permit: SemaphorePermit<'a>,
}

impl EngineHandle<'_> {
    /// The borrowed engine. `None` only once the handle is being dropped.
    pub fn engine_mut(&mut self) -> Option<&mut dyn MoveEngine> {
        match self.engine.as_mut() {
            Some(pooled) => Some(pooled.engine.as_mut()),
            None => None,
        }
    }

    /// Returns the engine to the pool.
    pub fn release(self) {}
}

impl Drop for EngineHandle<'_> {
    fn drop(&mut self) {
        if let Some(pooled) = self.engine.take() {
            self.pool.put_back(pooled);
        }
    }
}

/// The engine running one call: pooled on the committed path, disposable
/// for simulation, `CheckTx` and queries.
pub enum EngineLease<'a> {
    /// Borrowed from the pool.
    Pooled(EngineHandle<'a>),
    /// Created for this call only, destroyed afterwards.
    Isolated(Box<dyn MoveEngine>),
}

impl EngineLease<'_> {
    /// The engine.
    pub fn engine_mut(&mut self) -> Result<&mut dyn MoveEngine, BridgeError> {
        match self {
            Self::Pooled(handle) => handle
                .engine_mut()
                .ok_or_else(|| BridgeError::Config("engine handle holds no engine".into())),
            Self::Isolated(engine) => Ok(engine.as_mut()),
        }
    }

    /// Returns true if the engine belongs to the pool.
    #[must_use]
    pub fn is_pooled(&self) -> bool {
        matches!(self, Self::Pooled(_))
    }
}

// =============================================================================
// TESTS
// =============================================================================
