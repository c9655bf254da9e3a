//! Durable key-value storage for conversation state.

mod file;
mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::Error;
pub use file::JsonFileStore;
pub use memory::MemoryStore;

/// A process-wide key-value store that survives restarts.
///
/// Writes replace the whole value of a slot, the last writer wins. The
/// controller is the only writer of its slot, so no locking across
/// operations is needed.
#[async_trait]
pub trait Store: Send + Sync {
    /// Reads the value of a slot, `None` if it was never written.
    async fn get(&self, key: &str) -> Result<Option<Value>, Error>;

    /// Replaces the value of a slot.
    async fn update(&self, key: &str, value: Value) -> Result<(), Error>;
}

#[async_trait]
impl<S: Store + ?Sized> Store for Arc<S> {
    #[inline]
    async fn get(&self, key: &str) -> Result<Option<Value>, Error> {
        (**self).get(key).await
    }

    #[inline]
    async fn update(&self, key: &str, value: Value) -> Result<(), Error> {
        (**self).update(key, value).await
    }
}
