//! Session persistence adapters.

pub mod cached;
pub mod file;
pub mod in_memory;

use mnemos_core::error::PersistenceError;
use mnemos_core::persistence::SessionStore;
use std::path::PathBuf;
use std::sync::Arc;

pub use cached::CachedSessionStore;
pub use file::FileSessionStore;
pub use in_memory::InMemorySessionStore;

/// Build the configured backend behind an LRU cache.
///
/// `backend` is `"file"` (JSON files under `dir`) or `"memory"`.
pub fn open_store(
    backend: &str,
    dir: PathBuf,
    cache_capacity: usize,
) -> Result<Arc<dyn SessionStore>, PersistenceError> {
    let durable: Arc<dyn SessionStore> = match backend {
        "file" => Arc::new(FileSessionStore::new(dir)),
        "memory" => Arc::new(InMemorySessionStore::new()),
        other => {
            return Err(PersistenceError::Storage(format!(
                "Unknown persistence backend: {other}"
            )));
        }
    };
    Ok(Arc::new(CachedSessionStore::new(durable, cache_capacity)))
}
