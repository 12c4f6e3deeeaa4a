use std::{
    marker::PhantomData,
    path::{Path, PathBuf},
};

use axum::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tokio::{fs, io::AsyncWriteExt};
use tracing::{debug, warn};

use super::Table;
use crate::error::StorageError;

const TEMP_SUFFIX: &str = "tmp";

/// Table persisted as one pretty-printed JSON document.
///
/// Writes go to a sibling temp file which is synced and then renamed over
/// the target, so a failed `replace` leaves the previous document intact.
pub struct JsonFileTable<T> {
    name: String,
    path: PathBuf,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonFileTable<T>
where
    T: Serialize + DeserializeOwned + Default + Send + Sync + 'static,
{
    /// Open (or create) the table at `path`.
    pub async fn open(name: &str, path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let dir = parent_dir(&path);
        fs::create_dir_all(&dir).await?;

        let table = Self {
            name: name.to_string(),
            path,
            _marker: PhantomData,
        };
        table.sweep_temp_files(&dir).await?;

        if !fs::try_exists(&table.path).await? {
            table.replace(&T::default()).await?;
            debug!(table = %table.name, path = %table.path.display(), "table created");
        }
        Ok(table)
    }

    fn file_stem(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.name.clone())
    }

    fn temp_path(&self) -> PathBuf {
        parent_dir(&self.path).join(format!(
            ".{}.{}.{}",
            self.file_stem(),
            uuid::Uuid::new_v4(),
            TEMP_SUFFIX
        ))
    }

    /// Leftovers from writes interrupted before their rename.
    async fn sweep_temp_files(&self, dir: &Path) -> Result<(), StorageError> {
        let prefix = format!(".{}.", self.file_stem());
        let mut rd = fs::read_dir(dir).await?;
        while let Some(de) = rd.next_entry().await? {
            let name = de.file_name().to_string_lossy().into_owned();
            if name.starts_with(&prefix) && name.ends_with(TEMP_SUFFIX) {
                warn!(table = %self.name, file = %name, "removing stale temp file");
                let _ = fs::remove_file(de.path()).await;
            }
        }
        Ok(())
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Persist directory entries, so a completed rename survives a crash.
#[cfg(unix)]
async fn sync_dir(dir: &Path) -> Result<(), StorageError> {
    fs::File::open(dir).await?.sync_all().await?;
    Ok(())
}

#[cfg(not(unix))]
async fn sync_dir(_dir: &Path) -> Result<(), StorageError> {
    Ok(())
}

#[async_trait]
impl<T> Table<T> for JsonFileTable<T>
where
    T: Serialize + DeserializeOwned + Default + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self) -> Result<T, StorageError> {
        let bytes = match fs::read(&self.path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
            Err(e) => return Err(e.into()),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(T::default());
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn replace(&self, value: &T) -> Result<(), StorageError> {
        let body = serde_json::to_vec_pretty(value)?;
        let temp_path = self.temp_path();

        let written = async {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(&body).await?;
            file.sync_all().await?;
            Ok::<_, std::io::Error>(())
        }
        .await;
        if let Err(e) = written {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        if let Err(e) = fs::rename(&temp_path, &self.path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        sync_dir(&parent_dir(&self.path)).await?;
        debug!(table = %self.name, bytes = body.len(), "table replaced");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[tokio::test]
    async fn open_seeds_empty_collection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("entries.json");
        let table = JsonFileTable::<Vec<String>>::open("entries", &path).await.unwrap();

        assert!(path.exists());
        assert!(table.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn replace_is_visible_to_next_load_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.json");
        let table = JsonFileTable::<BTreeMap<String, String>>::open("notes", &path)
            .await
            .unwrap();

        let mut m = BTreeMap::new();
        m.insert("a".to_string(), "少油".to_string());
        table.replace(&m).await.unwrap();
        assert_eq!(table.load().await.unwrap(), m);

        let reopened = JsonFileTable::<BTreeMap<String, String>>::open("notes", &path)
            .await
            .unwrap();
        assert_eq!(reopened.load().await.unwrap(), m);
    }

    #[tokio::test]
    async fn failed_rename_cleans_up_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entries.json");
        let table = JsonFileTable::<Vec<u32>>::open("entries", &path).await.unwrap();
        table.replace(&vec![1, 2, 3]).await.unwrap();

        // The target becomes a non-empty directory, so the rename cannot succeed.
        fs::remove_file(&path).await.unwrap();
        fs::create_dir(&path).await.unwrap();
        fs::write(path.join("keep"), b"x").await.unwrap();
        assert!(table.replace(&vec![9]).await.is_err());

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn unserializable_value_keeps_previous_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("odd.json");
        let table = JsonFileTable::<BTreeMap<Vec<u32>, u32>>::open("odd", &path)
            .await
            .unwrap();
        let before = std::fs::read(&path).unwrap();

        let mut bad = BTreeMap::new();
        bad.insert(vec![1], 1);
        let err = table.replace(&bad).await.unwrap_err();
        assert!(matches!(err, StorageError::Serialization(_)));
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn directory_sync_after_rename() {
        let dir = tempfile::tempdir().unwrap();
        sync_dir(dir.path()).await.unwrap();

        let path = dir.path().join("entries.json");
        let table = JsonFileTable::<Vec<u32>>::open("entries", &path).await.unwrap();
        table.replace(&vec![7]).await.unwrap();
        assert_eq!(table.load().await.unwrap(), vec![7]);

        let missing = dir.path().join("gone");
        assert!(matches!(sync_dir(&missing).await, Err(StorageError::Io(_))));
    }

    #[tokio::test]
    async fn open_removes_stale_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let stale = dir.path().join(".entries.json.1234.tmp");
        std::fs::write(&stale, b"[1,").unwrap();

        let table = JsonFileTable::<Vec<u32>>::open("entries", dir.path().join("entries.json"))
            .await
            .unwrap();
        assert!(!stale.exists());
        assert!(table.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupt_document_is_a_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entries.json");
        let table = JsonFileTable::<Vec<u32>>::open("entries", &path).await.unwrap();
        std::fs::write(&path, b"{not json").unwrap();

        let err = table.load().await.unwrap_err();
        assert!(matches!(err, StorageError::Serialization(_)));
    }

    #[tokio::test]
    async fn blank_file_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entries.json");
        let table = JsonFileTable::<Vec<u32>>::open("entries", &path).await.unwrap();
        std::fs::write(&path, b"  \n").unwrap();
        assert!(table.load().await.unwrap().is_empty());
    }
}
