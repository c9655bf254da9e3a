use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use super::Store;
use crate::Error;

#[derive(Default)]
struct Inner {
    slots: Mutex<HashMap<String, Value>>,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
}

/// A store that lives only as long as the process.
///
/// Clones share the same slots, so a clone kept aside can observe what the
/// controller wrote. It also counts writes and can be told to reject them,
/// which is what tests use it for.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    /// Returns how many successful `update` calls were made.
    #[inline]
    pub fn writes(&self) -> usize {
        self.inner.writes.load(Ordering::SeqCst)
    }

    /// Makes every following `update` fail until switched back.
    #[inline]
    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, Error> {
        let slots =
            self.inner.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(slots.get(key).cloned())
    }

    async fn update(&self, key: &str, value: Value) -> Result<(), Error> {
        if self.inner.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Unavailable("writes are disabled".to_owned()));
        }
        self.inner
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_owned(), value);
        self.inner.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
