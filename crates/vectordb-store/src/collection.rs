//! Collection engine.
//!
//! A [`Collection`] owns one slot registry, its free/used partition, a
//! per-slot lock table, an ANN worker and a snapshot scheduler. Payloads are
//! written to `<dir>/<id>.block` as soon as an item is set; the registry and
//! the exported index are persisted together in `<dir>/index.bin` on a
//! debounced schedule.
//!
//! Every mutation of a slot runs under that slot's lock. The registry and
//! partition sit behind a synchronous mutex that is never held across an
//! await. Reads do not take slot locks.

use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use futures::future::try_join_all;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use vectordb_embeddings::Embedder;
use vectordb_index::{AnnWorker, HnswIndex};

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::fs::BlockFs;
use crate::locks::SlotLocks;
use crate::registry::{Registry, SlotFlags};
use crate::scheduler::{SaveScheduler, SnapshotTarget};
use crate::slots::SlotAllocator;
use crate::snapshot;
use crate::SlotId;

/// Snapshot file name inside a collection directory.
pub const SNAPSHOT_FILE: &str = "index.bin";

/// Extension of per-item payload files.
pub const BLOCK_EXTENSION: &str = "block";

/// Result count used when a search does not set a limit.
pub const DEFAULT_SEARCH_LIMIT: usize = 10;

/// A stored item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: SlotId,
    /// `None` when the slot is live but has no body.
    pub payload: Option<Value>,
}

impl Item {
    pub fn new(id: SlotId, payload: Option<Value>) -> Self {
        Self { id, payload }
    }
}

/// An item with its distance to a search query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredItem {
    pub item: Item,
    pub distance: f32,
}

/// Options for `find_by_vector` / `find_by_text`.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub limit: Option<usize>,
    pub cancel: Option<CancellationToken>,
}

impl SearchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_SEARCH_LIMIT)
    }
}

/// Point-in-time collection statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionStats {
    pub name: String,
    pub capacity: usize,
    pub size: usize,
    pub reserved: usize,
    pub dimension: usize,
    /// `None` until the ANN worker has been started
    pub indexed_vectors: Option<usize>,
    pub save_pending: bool,
}

/// Registry plus the partition derived from it.
struct SlotTable {
    registry: Registry,
    allocator: SlotAllocator,
}

impl SlotTable {
    fn new(capacity: usize) -> Self {
        Self {
            registry: Registry::new(capacity),
            allocator: SlotAllocator::new(capacity),
        }
    }

    fn from_registry(registry: Registry) -> Self {
        let allocator = SlotAllocator::from_registry(&registry);
        Self {
            registry,
            allocator,
        }
    }
}

/// Run `fut`, giving up with [`StoreError::Cancelled`] if `token` fires first.
pub(crate) async fn cancellable<F, T>(
    token: Option<&CancellationToken>,
    fut: F,
) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match token {
        Some(token) => {
            tokio::select! {
                biased;
                _ = token.cancelled() => Err(StoreError::Cancelled),
                result = fut => result,
            }
        }
        None => fut.await,
    }
}

/// Embed `text`, honoring an optional cancellation token.
pub(crate) async fn embed_text(
    embedder: &dyn Embedder,
    text: &str,
    cancel: Option<&CancellationToken>,
) -> Result<Vec<f32>, StoreError> {
    cancellable(cancel, async {
        let embedding = embedder.embed(text).await?;
        Ok::<_, StoreError>(embedding.into_vec())
    })
    .await
}

/// One named collection.
pub struct Collection {
    name: String,
    dir: PathBuf,
    config: StoreConfig,
    fs: Arc<dyn BlockFs>,
    embedder: Arc<dyn Embedder>,
    slots: Mutex<SlotTable>,
    locks: SlotLocks,
    ann: Mutex<Option<Arc<AnnWorker>>>,
    scheduler: SaveScheduler<Collection>,
    loaded: OnceCell<()>,
    destroyed: AtomicBool,
}

impl Collection {
    /// Create an engine for `name` under `config.root`. Nothing is read
    /// until [`Collection::load`].
    pub fn open(
        name: impl Into<String>,
        config: StoreConfig,
        fs: Arc<dyn BlockFs>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Arc<Self>, StoreError> {
        config.validate()?;
        let name = name.into();
        let dir = config.collection_dir(&name);
        let interval = config.save_interval;
        let capacity = config.capacity;

        Ok(Arc::new_cyclic(|weak: &Weak<Collection>| Self {
            name,
            dir,
            config,
            fs,
            embedder,
            slots: Mutex::new(SlotTable::new(capacity)),
            locks: SlotLocks::new(),
            ann: Mutex::new(None),
            scheduler: SaveScheduler::new(interval, weak.clone()),
            loaded: OnceCell::new(),
            destroyed: AtomicBool::new(false),
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &std::path::Path {
        &self.dir
    }

    pub fn capacity(&self) -> usize {
        self.slots.lock().registry.capacity()
    }

    pub fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn snapshot_path(&self) -> PathBuf {
        self.dir.join(SNAPSHOT_FILE)
    }

    fn block_path(&self, id: SlotId) -> PathBuf {
        self.dir.join(format!("{}.{}", id, BLOCK_EXTENSION))
    }

    fn check_id(&self, id: SlotId) -> Result<(), StoreError> {
        let capacity = self.capacity();
        if id as usize >= capacity {
            return Err(StoreError::InvalidArgument(format!(
                "slot {} is outside collection {} (capacity {})",
                id, self.name, capacity
            )));
        }
        Ok(())
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), StoreError> {
        if vector.len() != self.config.dimension {
            return Err(StoreError::InvalidArgument(format!(
                "vector has dimension {}, collection {} expects {}",
                vector.len(),
                self.name,
                self.config.dimension
            )));
        }
        Ok(())
    }

    /// The ANN worker, spawned on first use.
    fn ann(&self) -> Result<Arc<AnnWorker>, StoreError> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(StoreError::Closed(self.name.clone()));
        }

        let mut slot = self.ann.lock();
        if let Some(worker) = slot.as_ref().filter(|w| !w.is_terminated()) {
            return Ok(worker.clone());
        }

        let index = HnswIndex::new(self.config.hnsw_config())?;
        let worker = Arc::new(AnnWorker::spawn(self.name.clone(), Box::new(index))?);
        *slot = Some(worker.clone());
        Ok(worker)
    }

    fn discard_ann(&self) {
        if let Some(worker) = self.ann.lock().take() {
            worker.terminate();
        }
    }

    /// Read the snapshot, if any, and rebuild in-memory state from it.
    /// Idempotent; concurrent callers share one in-flight load.
    pub async fn load(&self) -> Result<(), StoreError> {
        self.loaded
            .get_or_try_init(|| self.load_snapshot())
            .await
            .map(|_| ())
    }

    async fn load_snapshot(&self) -> Result<(), StoreError> {
        let path = self.snapshot_path();
        let bytes = match self.fs.read_file(&path).await? {
            Some(bytes) if !bytes.is_empty() => bytes,
            _ => {
                debug!(collection = %self.name, "No snapshot, starting empty");
                return Ok(());
            }
        };

        let snapshot = snapshot::decode(&bytes).map_err(|e| match e {
            StoreError::CorruptSnapshot(reason) => {
                StoreError::CorruptSnapshot(format!("{}: {}", path.display(), reason))
            }
            other => other,
        })?;

        if snapshot.registry.capacity() != self.config.capacity {
            warn!(
                collection = %self.name,
                persisted = snapshot.registry.capacity(),
                configured = self.config.capacity,
                "Snapshot capacity differs from configuration, keeping persisted capacity"
            );
        }

        let ann = self.ann()?;
        ann.load(snapshot.index).await?;

        let table = SlotTable::from_registry(snapshot.registry);
        let size = table.allocator.used_len();
        *self.slots.lock() = table;

        info!(collection = %self.name, size, "Loaded collection");
        Ok(())
    }

    /// Number of live items.
    pub fn size(&self) -> usize {
        self.slots.lock().allocator.used_len()
    }

    /// Item stored in `id`, or `None` if the slot is not live.
    pub async fn get(&self, id: SlotId) -> Result<Option<Item>, StoreError> {
        let flags = self.slots.lock().registry.get(id);
        if !flags.is_valid() {
            return Ok(None);
        }
        if !flags.has_file() {
            return Ok(Some(Item::new(id, None)));
        }

        match self.fs.read_file(&self.block_path(id)).await? {
            Some(bytes) => {
                let payload: Value = serde_json::from_slice(&bytes)?;
                Ok(Some(Item::new(id, Some(payload))))
            }
            None => {
                // A concurrent delete may have won the race
                let flags = self.slots.lock().registry.get(id);
                if !flags.is_valid() {
                    Ok(None)
                } else if !flags.has_file() {
                    Ok(Some(Item::new(id, None)))
                } else {
                    Err(StoreError::MissingBlock(id))
                }
            }
        }
    }

    /// `get` for every id, in parallel, preserving input order.
    pub async fn get_many(&self, ids: &[SlotId]) -> Result<Vec<Option<Item>>, StoreError> {
        try_join_all(ids.iter().map(|&id| self.get(id))).await
    }

    /// `get` for search and listing: a slot whose block is gone is treated
    /// as registry drift and skipped instead of failing the whole read.
    async fn resolve(&self, id: SlotId) -> Result<Option<Item>, StoreError> {
        match self.get(id).await {
            Err(StoreError::MissingBlock(id)) => {
                warn!(collection = %self.name, id, "Live slot has no block file, skipping");
                Ok(None)
            }
            other => other,
        }
    }

    /// Nearest items to `vector`, closest first.
    pub async fn find_by_vector(
        &self,
        vector: &[f32],
        options: &SearchOptions,
    ) -> Result<Vec<ScoredItem>, StoreError> {
        self.check_dimension(vector)?;
        let ann = self.ann()?;
        let k = options.limit();

        let matches = cancellable(options.cancel.as_ref(), async {
            ann.search(vector.to_vec(), k).await.map_err(StoreError::from)
        })
        .await?;

        let resolved = cancellable(
            options.cancel.as_ref(),
            try_join_all(matches.iter().map(|m| async move {
                match SlotId::try_from(m.label) {
                    Ok(id) => self.resolve(id).await,
                    Err(_) => Ok(None),
                }
            })),
        )
        .await?;

        let mut results = Vec::with_capacity(resolved.len());
        for (m, item) in matches.iter().zip(resolved) {
            match item {
                Some(item) => results.push(ScoredItem {
                    item,
                    distance: m.distance,
                }),
                None => warn!(
                    collection = %self.name,
                    label = m.label,
                    "Index returned a label with no live slot, skipping"
                ),
            }
        }
        Ok(results)
    }

    /// Embed `text` and search with the result.
    pub async fn find_by_text(
        &self,
        text: &str,
        options: &SearchOptions,
    ) -> Result<Vec<ScoredItem>, StoreError> {
        let vector = embed_text(self.embedder.as_ref(), text, options.cancel.as_ref()).await?;
        self.find_by_vector(&vector, options).await
    }

    /// Live items in partition order, up to `limit`.
    pub async fn list(&self, limit: Option<usize>) -> Result<Vec<Item>, StoreError> {
        let ids = self.slots.lock().allocator.used_ids(limit);
        let items = try_join_all(ids.iter().map(|&id| self.resolve(id))).await?;
        Ok(items.into_iter().flatten().collect())
    }

    /// Reserve a free slot.
    pub fn next_id(&self) -> Result<SlotId, StoreError> {
        let id = self.slots.lock().allocator.allocate()?;
        debug!(collection = %self.name, id, "Reserved slot");
        Ok(id)
    }

    /// Give back a reservation that was never written.
    pub fn release_reserved_id(&self, id: SlotId) -> Result<(), StoreError> {
        self.check_id(id)?;
        if !self.slots.lock().allocator.release(id) {
            return Err(StoreError::InvalidArgument(format!(
                "slot {} in collection {} holds a live item",
                id, self.name
            )));
        }
        debug!(collection = %self.name, id, "Released slot");
        Ok(())
    }

    /// Store `payload` in `id`, embedding `embed_source` (or the payload
    /// itself when it is a string).
    pub async fn set_item(
        &self,
        id: SlotId,
        payload: Option<Value>,
        embed_source: Option<&str>,
    ) -> Result<Item, StoreError> {
        self.check_id(id)?;
        let text = match (embed_source, &payload) {
            (Some(text), _) => text.to_string(),
            (None, Some(Value::String(text))) => text.clone(),
            _ => {
                return Err(StoreError::InvalidArgument(
                    "no embeddable value".to_string(),
                ))
            }
        };
        let vector = embed_text(self.embedder.as_ref(), &text, None).await?;
        self.set_item_with_vector(id, payload, &vector).await
    }

    /// Store `payload` in `id` under a precomputed vector. Overwrites any
    /// previous item in the slot.
    pub async fn set_item_with_vector(
        &self,
        id: SlotId,
        payload: Option<Value>,
        vector: &[f32],
    ) -> Result<Item, StoreError> {
        self.check_id(id)?;
        self.check_dimension(vector)?;
        let ann = self.ann()?;
        let vector = vector.to_vec();

        self.locks
            .with_lock(id, async move {
                let had_file = self.slots.lock().registry.get(id).has_file();
                let path = self.block_path(id);

                if let Some(value) = &payload {
                    let bytes = serde_json::to_vec(value)?;
                    self.fs.write_file(&path, &bytes).await?;
                }

                {
                    let mut slots = self.slots.lock();
                    let mut flags = SlotFlags::VALID;
                    flags.set(SlotFlags::HAS_FILE, payload.is_some());
                    slots.registry.set(id, flags);
                    slots.allocator.mark_used(id);
                }

                // Bits go first so readers never see HAS_FILE without a block
                if payload.is_none() && had_file {
                    self.fs.delete_file(&path).await?;
                }

                ann.add_point(vector, u64::from(id)).await?;
                self.scheduler.trigger();

                debug!(collection = %self.name, id, has_file = payload.is_some(), "Set item");
                Ok(Item::new(id, payload))
            })
            .await
    }

    /// Reserve a slot and store `payload` in it, releasing the reservation
    /// if the write fails.
    pub async fn insert(
        &self,
        payload: Option<Value>,
        embed_source: Option<&str>,
    ) -> Result<Item, StoreError> {
        let id = self.next_id()?;
        let result = self.set_item(id, payload, embed_source).await;
        self.rollback_on_error(id, result)
    }

    /// [`Collection::insert`] with a precomputed vector.
    pub async fn insert_with_vector(
        &self,
        payload: Option<Value>,
        vector: &[f32],
    ) -> Result<Item, StoreError> {
        let id = self.next_id()?;
        let result = self.set_item_with_vector(id, payload, vector).await;
        self.rollback_on_error(id, result)
    }

    fn rollback_on_error(
        &self,
        id: SlotId,
        result: Result<Item, StoreError>,
    ) -> Result<Item, StoreError> {
        if result.is_err() {
            if let Err(e) = self.release_reserved_id(id) {
                warn!(collection = %self.name, id, error = %e, "Could not release slot after failed insert");
            }
        }
        result
    }

    /// Remove the item in `id`.
    pub async fn delete_item(&self, id: SlotId) -> Result<(), StoreError> {
        self.check_id(id)?;
        let ann = self.ann()?;

        self.locks
            .with_lock(id, async move {
                let flags = {
                    let mut slots = self.slots.lock();
                    let flags = slots.registry.get(id);
                    if flags.is_valid() {
                        slots.registry.set(id, SlotFlags::empty());
                        slots.allocator.mark_free(id);
                    }
                    flags
                };
                if !flags.is_valid() {
                    return Err(StoreError::NotFound(format!(
                        "item {} in collection {}",
                        id, self.name
                    )));
                }

                ann.remove_point(u64::from(id)).await?;
                self.scheduler.trigger();

                // A block left behind by a failed delete is unreachable garbage
                if flags.has_file() {
                    self.fs.delete_file(&self.block_path(id)).await?;
                }

                debug!(collection = %self.name, id, "Deleted item");
                Ok(())
            })
            .await
    }

    /// Persist the registry and the exported index as one snapshot.
    pub async fn save(&self) -> Result<(), StoreError> {
        self.scheduler
            .exclusive(async {
                let ann = self.ann()?;
                let registry = self.slots.lock().registry.clone();
                let index = ann.save().await?;

                let blob = snapshot::encode(&registry, &index);
                self.fs.write_file(&self.snapshot_path(), &blob).await?;

                info!(
                    collection = %self.name,
                    size = registry.valid_count(),
                    bytes = blob.len(),
                    "Saved snapshot"
                );
                Ok(())
            })
            .await
    }

    /// Drop any pending scheduled save and save now.
    pub async fn flush(&self) -> Result<(), StoreError> {
        self.scheduler.cancel();
        self.save().await
    }

    /// Ask for a snapshot on the debounced schedule.
    pub fn trigger_save(&self) {
        self.scheduler.trigger();
    }

    /// Reset to an empty collection and wipe its directory.
    pub async fn clear(&self) -> Result<(), StoreError> {
        self.scheduler
            .exclusive(async {
                self.scheduler.cancel();
                self.discard_ann();
                let capacity = self.config.capacity;
                *self.slots.lock() = SlotTable::new(capacity);
                self.fs.clear_directory(&self.dir).await?;
                info!(collection = %self.name, "Cleared collection");
                Ok(())
            })
            .await
    }

    /// Delete the collection directory.
    pub async fn remove(&self) -> Result<(), StoreError> {
        self.scheduler
            .exclusive(async {
                self.fs.remove_directory(&self.dir).await?;
                info!(collection = %self.name, "Removed collection directory");
                Ok(())
            })
            .await
    }

    /// Stop the ANN worker and cancel any pending save. Files are left
    /// alone; the engine rejects further index work afterwards.
    pub fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
        self.scheduler.cancel();
        self.discard_ann();
        debug!(collection = %self.name, "Destroyed collection engine");
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub async fn stats(&self) -> Result<CollectionStats, StoreError> {
        let (capacity, size, reserved) = {
            let slots = self.slots.lock();
            (
                slots.registry.capacity(),
                slots.allocator.used_len(),
                slots.allocator.reserved_len(),
            )
        };

        let worker = self.ann.lock().clone();
        let indexed_vectors = match worker {
            Some(worker) if !worker.is_terminated() => Some(worker.stats().await?.vector_count),
            _ => None,
        };

        Ok(CollectionStats {
            name: self.name.clone(),
            capacity,
            size,
            reserved,
            dimension: self.config.dimension,
            indexed_vectors,
            save_pending: self.scheduler.is_pending(),
        })
    }
}

#[async_trait]
impl SnapshotTarget for Collection {
    fn label(&self) -> &str {
        &self.name
    }

    async fn persist(&self) -> Result<(), StoreError> {
        self.save().await
    }
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("dir", &self.dir)
            .field("size", &self.size())
            .finish()
    }
}
