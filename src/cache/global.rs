//! Process-wide cache instance.
//!
//! The host program keeps a single [`OriginCache`] per process. A
//! [`CacheCell`] initialises it once, hands out shared handles, and
//! releases the backing file on [`CacheCell::shutdown`]. Code that only
//! needs the repository should take an `Arc<OriginCache>` rather than
//! reaching for [`global`].

use std::path::Path;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use super::database::OriginCache;
use super::error::{CacheError, CacheResult};
use crate::config::CacheConfig;

static GLOBAL: OnceLock<CacheCell> = OnceLock::new();

/// The process-wide cell.
pub fn global() -> &'static CacheCell {
    GLOBAL.get_or_init(CacheCell::new)
}

/// Holder for at most one open cache.
#[derive(Debug, Default)]
pub struct CacheCell {
    slot: Mutex<Option<Arc<OriginCache>>>,
}

impl CacheCell {
    /// An empty cell.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the cache in `dir`, or return the one already open.
    ///
    /// Concurrent callers block until the first initialisation finishes;
    /// if it failed, the next caller tries again.
    pub fn init(&self, dir: &Path, config: &CacheConfig) -> CacheResult<Arc<OriginCache>> {
        let mut slot = self.slot.lock();
        if let Some(cache) = slot.as_ref() {
            let requested = dir.join(super::store::DATABASE_FILE_NAME);
            if cache.path() != requested {
                log::warn!(
                    "Origin cache already open at {}, ignoring {}",
                    cache.path().display(),
                    requested.display()
                );
            }
            return Ok(Arc::clone(cache));
        }

        let cache = Arc::new(OriginCache::open(dir, config)?);
        log::info!("Origin cache initialized at {}", cache.path().display());
        *slot = Some(Arc::clone(&cache));
        Ok(cache)
    }

    /// The open cache, or [`CacheError::NotInitialized`].
    pub fn get(&self) -> CacheResult<Arc<OriginCache>> {
        self.slot.lock().clone().ok_or(CacheError::NotInitialized)
    }

    /// Whether a cache is open.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Drop the cell's handle and close the backing file.
    ///
    /// If other handles are still alive the file is released when the
    /// last of them is dropped.
    pub fn shutdown(&self) -> CacheResult<()> {
        let Some(cache) = self.slot.lock().take() else {
            return Ok(());
        };
        match Arc::try_unwrap(cache) {
            Ok(cache) => cache.close(),
            Err(shared) => {
                log::debug!(
                    "Origin cache {} still referenced, closing on last drop",
                    shared.path().display()
                );
                Ok(())
            }
        }
    }
}
