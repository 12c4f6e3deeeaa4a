use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Mutex,
};

use axum::async_trait;

use super::Table;
use crate::error::StorageError;

/// In-memory table for tests. Writes can be made to fail on demand.
pub struct MemoryTable<T> {
    data: Mutex<T>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl<T> MemoryTable<T> {
    pub fn new(initial: T) -> Self {
        Self {
            data: Mutex::new(initial),
            fail_writes: AtomicBool::new(false),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl<T: Default> Default for MemoryTable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

#[async_trait]
impl<T> Table<T> for MemoryTable<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        "memory"
    }

    async fn load(&self) -> Result<T, StorageError> {
        let data = self.data.lock().expect("memory table poisoned");
        Ok(data.clone())
    }

    async fn replace(&self, value: &T) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Io(std::io::Error::other("injected write failure")));
        }
        *self.data.lock().expect("memory table poisoned") = value.clone();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
