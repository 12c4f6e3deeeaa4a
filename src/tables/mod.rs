//! Persistent tables: named collections read and replaced as a whole.

mod file;
#[cfg(test)]
mod memory;

use std::sync::Arc;

use axum::async_trait;
use tokio::sync::Mutex;

use crate::error::{StorageError, StoreError};

pub use file::JsonFileTable;
#[cfg(test)]
pub use memory::MemoryTable;

#[async_trait]
pub trait Table<T>: Send + Sync
where
    T: Send + Sync + 'static,
{
    /// Table name used in logs.
    fn name(&self) -> &str;

    async fn load(&self) -> Result<T, StorageError>;

    /// Overwrite the whole collection. On error the previous contents stay readable.
    async fn replace(&self, value: &T) -> Result<(), StorageError>;

    async fn close(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

/// A table plus the single-writer lock serializing its load-modify-store cycles.
pub struct Guarded<T: Send + Sync + 'static> {
    table: Arc<dyn Table<T>>,
    write_lock: Mutex<()>,
}

impl<T: Send + Sync + 'static> Guarded<T> {
    pub fn new(table: Arc<dyn Table<T>>) -> Self {
        Self {
            table,
            write_lock: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        self.table.name()
    }

    pub async fn read(&self) -> Result<T, StorageError> {
        self.table.load().await
    }

    /// Load, apply `f`, and store the result. Nothing is written when `f` fails.
    pub async fn update<R, F>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut T) -> Result<R, StoreError> + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut value = self.table.load().await?;
        let out = f(&mut value)?;
        self.table.replace(&value).await?;
        Ok(out)
    }

    /// Like `update`, but skips the write when `f` reports no change.
    pub async fn update_if<F>(&self, f: F) -> Result<bool, StoreError>
    where
        F: FnOnce(&mut T) -> bool + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut value = self.table.load().await?;
        if !f(&mut value) {
            return Ok(false);
        }
        self.table.replace(&value).await?;
        Ok(true)
    }

    /// Waits for any in-flight write before closing the backing table.
    pub async fn close(&self) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        self.table.close().await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[tokio::test]
    async fn failed_closure_writes_nothing() {
        let mem = Arc::new(MemoryTable::new(vec![1u32, 2]));
        let guarded = Guarded::new(mem.clone() as Arc<dyn Table<Vec<u32>>>);

        let err = guarded
            .update(|v| {
                v.push(3);
                Err::<(), _>(StoreError::NotFound(uuid::Uuid::nil()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert_eq!(guarded.read().await.unwrap(), vec![1, 2]);
        assert_eq!(mem.write_count(), 0);
    }

    #[tokio::test]
    async fn update_if_skips_unchanged() {
        let mem = Arc::new(MemoryTable::new(BTreeMap::<String, u32>::new()));
        let guarded = Guarded::new(mem.clone() as Arc<dyn Table<BTreeMap<String, u32>>>);

        let changed = guarded.update_if(|m| m.remove("missing").is_some()).await.unwrap();
        assert!(!changed);
        assert_eq!(mem.write_count(), 0);
    }

    #[tokio::test]
    async fn concurrent_updates_do_not_lose_writes() {
        let mem = Arc::new(MemoryTable::new(Vec::<u32>::new()));
        let guarded = Arc::new(Guarded::new(mem as Arc<dyn Table<Vec<u32>>>));

        let mut handles = Vec::new();
        for i in 0..16u32 {
            let g = guarded.clone();
            handles.push(tokio::spawn(async move {
                g.update(|v| {
                    v.push(i);
                    Ok(())
                })
                .await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(guarded.read().await.unwrap().len(), 16);
    }
}
