use std::{
    collections::{BTreeMap, HashSet},
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::repo_types::{
    DeletionTable, Entry, EntryTable, NutritionSnapshot, NutritionTable, SupplementTable,
};
use crate::{
    error::{StorageError, StoreError},
    nutrition::NutritionExtractor,
    storage::ImageStore,
    tables::{Guarded, JsonFileTable, Table},
};

/// Owns the entry, supplement and nutrition tables and keeps them consistent.
///
/// Cross-table writes are sequential, each one independently durable. Every
/// cleanup step is remove-if-present, so retrying or sweeping converges.
/// A delete records the image key in `deletions` before the entry row goes
/// and clears it only once the image is gone.
pub struct RecordStore {
    entries: Guarded<EntryTable>,
    supplements: Guarded<SupplementTable>,
    nutrition: Guarded<NutritionTable>,
    deletions: Guarded<DeletionTable>,
    images: Arc<dyn ImageStore>,
    extractor: Arc<dyn NutritionExtractor>,
    // held by every multi-table write (analysis, delete, sweep)
    cascade: Mutex<()>,
    closed: AtomicBool,
}

impl RecordStore {
    pub fn new(
        entries: Arc<dyn Table<EntryTable>>,
        supplements: Arc<dyn Table<SupplementTable>>,
        nutrition: Arc<dyn Table<NutritionTable>>,
        deletions: Arc<dyn Table<DeletionTable>>,
        images: Arc<dyn ImageStore>,
        extractor: Arc<dyn NutritionExtractor>,
    ) -> Self {
        Self {
            entries: Guarded::new(entries),
            supplements: Guarded::new(supplements),
            nutrition: Guarded::new(nutrition),
            deletions: Guarded::new(deletions),
            images,
            extractor,
            cascade: Mutex::new(()),
            closed: AtomicBool::new(false),
        }
    }

    /// Open the JSON tables under `data_dir`.
    pub async fn open(
        data_dir: &Path,
        images: Arc<dyn ImageStore>,
        extractor: Arc<dyn NutritionExtractor>,
    ) -> Result<Self, StorageError> {
        let entries = JsonFileTable::<EntryTable>::open("entries", data_dir.join("entries.json")).await?;
        let supplements =
            JsonFileTable::<SupplementTable>::open("supplements", data_dir.join("supplements.json"))
                .await?;
        let nutrition =
            JsonFileTable::<NutritionTable>::open("nutrition", data_dir.join("nutrition.json"))
                .await?;
        let deletions =
            JsonFileTable::<DeletionTable>::open("deletions", data_dir.join("deletions.json"))
                .await?;
        info!(dir = %data_dir.display(), "record store opened");
        Ok(Self::new(
            Arc::new(entries),
            Arc::new(supplements),
            Arc::new(nutrition),
            Arc::new(deletions),
            images,
            extractor,
        ))
    }

    /// Refuse further operations and wait for in-flight writes to land.
    pub async fn close(&self) -> Result<(), StorageError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.entries.close().await?;
        self.supplements.close().await?;
        self.nutrition.close().await?;
        self.deletions.close().await?;
        info!("record store closed");
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), StorageError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StorageError::Closed);
        }
        Ok(())
    }

    pub fn images(&self) -> &Arc<dyn ImageStore> {
        &self.images
    }

    #[instrument(skip(self, url))]
    pub async fn create_entry(
        &self,
        filename: String,
        url: String,
        timestamp: OffsetDateTime,
    ) -> Result<Entry, StoreError> {
        self.ensure_open()?;
        let entry = self
            .entries
            .update(|rows| {
                let mut id = Uuid::new_v4();
                while rows.iter().any(|e| e.id == id) {
                    id = Uuid::new_v4();
                }
                let entry = Entry {
                    id,
                    filename,
                    url,
                    timestamp,
                    analysis: String::new(),
                };
                rows.push(entry.clone());
                Ok(entry)
            })
            .await?;
        info!(id = %entry.id, "entry created");
        Ok(entry)
    }

    /// Entries in insertion order.
    pub async fn list_entries(&self) -> Result<Vec<Entry>, StoreError> {
        self.ensure_open()?;
        Ok(self.entries.read().await?)
    }

    pub async fn get_entry(&self, id: Uuid) -> Result<Entry, StoreError> {
        self.ensure_open()?;
        self.entries
            .read()
            .await?
            .into_iter()
            .find(|e| e.id == id)
            .ok_or(StoreError::NotFound(id))
    }

    /// The entry with its supplement note and nutrition snapshot, if any.
    pub async fn entry_details(
        &self,
        id: Uuid,
    ) -> Result<(Entry, Option<String>, Option<NutritionSnapshot>), StoreError> {
        let entry = self.get_entry(id).await?;
        let note = self.supplements.read().await?.remove(&id);
        let nutrition = self.nutrition.read().await?.remove(&id);
        Ok((entry, note, nutrition))
    }

    /// Store an analysis, its supplement note, and the nutrition scraped from it.
    ///
    /// Fails with `NotFound` before touching any table when `id` is unknown.
    #[instrument(skip(self, analysis, note), fields(chars = analysis.len()))]
    pub async fn record_analysis(
        &self,
        id: Uuid,
        analysis: &str,
        note: &str,
    ) -> Result<Option<NutritionSnapshot>, StoreError> {
        self.ensure_open()?;
        let _cascade = self.cascade.lock().await;
        let timestamp = self
            .entries
            .update(|rows| {
                let entry = rows
                    .iter_mut()
                    .find(|e| e.id == id)
                    .ok_or(StoreError::NotFound(id))?;
                entry.analysis = analysis.to_string();
                Ok(entry.timestamp)
            })
            .await?;

        let note = note.to_string();
        self.supplements
            .update(move |notes| {
                notes.insert(id, note);
                Ok(())
            })
            .await?;

        let snapshot = self
            .extractor
            .extract(analysis)
            .map(|facts| NutritionSnapshot { timestamp, facts });
        if let Some(snap) = snapshot {
            self.nutrition
                .update(move |rows| {
                    rows.insert(id, snap);
                    Ok(())
                })
                .await?;
        }

        info!(%id, extracted = snapshot.is_some(), "analysis recorded");
        Ok(snapshot)
    }

    /// Remove an entry, its note, its snapshot, and finally its image.
    ///
    /// Calling again after a failed attempt finishes the remaining cleanup.
    #[instrument(skip(self))]
    pub async fn delete_entry(&self, id: Uuid) -> Result<(), StoreError> {
        self.ensure_open()?;
        let _cascade = self.cascade.lock().await;
        let filename = match self.entries.read().await?.into_iter().find(|e| e.id == id) {
            Some(entry) => entry.filename,
            None => self
                .deletions
                .read()
                .await?
                .remove(&id)
                .ok_or(StoreError::NotFound(id))?,
        };

        self.deletions
            .update_if(|pending| pending.insert(id, filename.clone()).as_ref() != Some(&filename))
            .await?;
        self.entries
            .update_if(|rows| {
                let before = rows.len();
                rows.retain(|e| e.id != id);
                rows.len() != before
            })
            .await?;
        self.finish_delete(id, &filename).await?;

        info!(%id, "entry deleted");
        Ok(())
    }

    /// Everything after the entry row: note, snapshot, image, then the marker.
    async fn finish_delete(&self, id: Uuid, filename: &str) -> Result<(), StoreError> {
        self.supplements.update_if(|notes| notes.remove(&id).is_some()).await?;
        self.nutrition.update_if(|rows| rows.remove(&id).is_some()).await?;
        // irreversible, so only after every table agrees the entry is gone
        self.images.delete_object(filename).await?;
        self.deletions.update_if(|pending| pending.remove(&id).is_some()).await?;
        Ok(())
    }

    /// Snapshots whose entry is still live.
    pub async fn nutrition_by_entry(&self) -> Result<NutritionTable, StoreError> {
        self.ensure_open()?;
        let live = self.live_ids().await?;
        let mut rows = self.nutrition.read().await?;
        rows.retain(|id, _| live.contains(id));
        Ok(rows)
    }

    /// Finish interrupted deletes and drop notes and snapshots with no entry.
    ///
    /// Returns how many deletes were finished plus how many orphan rows went.
    pub async fn sweep_orphans(&self) -> Result<usize, StoreError> {
        self.ensure_open()?;
        let _cascade = self.cascade.lock().await;
        let live = self.live_ids().await?;

        let mut finished = 0;
        for (id, filename) in self.deletions.read().await? {
            if live.contains(&id) {
                continue;
            }
            self.finish_delete(id, &filename).await?;
            warn!(%id, key = %filename, "interrupted delete finished");
            finished += 1;
        }
        // the entry row never went, so nothing was removed yet
        self.deletions
            .update_if(|pending| {
                let before = pending.len();
                pending.retain(|id, _| !live.contains(id));
                pending.len() != before
            })
            .await?;

        let notes = retain_live(&self.supplements, &live).await?;
        let snapshots = retain_live(&self.nutrition, &live).await?;
        Ok(finished + notes + snapshots)
    }

    async fn live_ids(&self) -> Result<HashSet<Uuid>, StorageError> {
        Ok(self.entries.read().await?.iter().map(|e| e.id).collect())
    }
}

async fn retain_live<V>(
    table: &Guarded<BTreeMap<Uuid, V>>,
    live: &HashSet<Uuid>,
) -> Result<usize, StoreError>
where
    V: Send + Sync + 'static,
{
    let mut removed = 0;
    table
        .update_if(|rows| {
            let before = rows.len();
            rows.retain(|id, _| live.contains(id));
            removed = before - rows.len();
            removed > 0
        })
        .await?;
    if removed > 0 {
        warn!(table = table.name(), removed, "orphan rows removed");
    }
    Ok(removed)
}
