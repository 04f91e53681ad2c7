//! Collection registry client.
//!
//! [`VectorDbClient`] maps collection names to loaded [`Collection`]
//! engines under one data directory. Lifecycle changes are announced on a
//! broadcast channel; see [`VectorDbClient::subscribe`].

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::try_join_all;
use parking_lot::RwLock;
use tokio::sync::{broadcast, Mutex, OnceCell};
use tracing::{debug, info, warn};

use vectordb_embeddings::Embedder;

use crate::collection::{embed_text, Collection, ScoredItem, SearchOptions};
use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::fs::{BlockFs, LocalFs};

const EVENT_CAPACITY: usize = 64;

/// Lifecycle notifications published by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionEvent {
    Created(String),
    Loaded(String),
    Deleted(String),
    Forgotten(String),
    Cleared,
}

/// A search hit tagged with the collection it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionHit {
    pub collection: String,
    pub hit: ScoredItem,
}

/// Name → engine registry over one data directory.
pub struct VectorDbClient {
    config: StoreConfig,
    fs: Arc<dyn BlockFs>,
    embedder: Arc<dyn Embedder>,
    collections: RwLock<HashMap<String, Arc<Collection>>>,
    create_lock: Mutex<()>,
    loaded: OnceCell<()>,
    events: broadcast::Sender<CollectionEvent>,
}

fn validate_name(name: &str) -> Result<(), StoreError> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if bad {
        return Err(StoreError::InvalidArgument(format!(
            "invalid collection name: {:?}",
            name
        )));
    }
    Ok(())
}

impl VectorDbClient {
    pub fn new(config: StoreConfig, fs: Arc<dyn BlockFs>, embedder: Arc<dyn Embedder>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            config,
            fs,
            embedder,
            collections: RwLock::new(HashMap::new()),
            create_lock: Mutex::new(()),
            loaded: OnceCell::new(),
            events,
        }
    }

    /// Client over the local filesystem.
    pub fn local(config: StoreConfig, embedder: Arc<dyn Embedder>) -> Self {
        Self::new(config, Arc::new(LocalFs::new()), embedder)
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Receive lifecycle events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<CollectionEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: CollectionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn open(&self, name: &str) -> Result<Arc<Collection>, StoreError> {
        Collection::open(
            name,
            self.config.clone(),
            self.fs.clone(),
            self.embedder.clone(),
        )
    }

    /// Open and load every collection found in the data directory.
    /// Runs once; later calls wait for the first to finish.
    pub async fn load_all(&self) -> Result<(), StoreError> {
        self.loaded
            .get_or_try_init(|| self.load_persisted())
            .await
            .map(|_| ())
    }

    async fn load_persisted(&self) -> Result<(), StoreError> {
        let names = self.fs.read_directory(&self.config.root).await?;
        let pending: Vec<_> = {
            let collections = self.collections.read();
            names
                .into_iter()
                .filter(|name| !collections.contains_key(name))
                .collect()
        };

        let loaded = try_join_all(pending.iter().map(|name| async move {
            let collection = self.open(name)?;
            collection.load().await?;
            Ok::<_, StoreError>(collection)
        }))
        .await?;

        let count = loaded.len();
        for collection in loaded {
            let name = collection.name().to_string();
            let previous = self
                .collections
                .write()
                .entry(name.clone())
                .or_insert(collection.clone())
                .clone();
            if Arc::ptr_eq(&previous, &collection) {
                self.emit(CollectionEvent::Loaded(name));
            } else {
                // Created concurrently while we were loading
                collection.destroy();
            }
        }

        info!(root = ?self.config.root, count, "Loaded collections");
        Ok(())
    }

    /// Registered collection, if any.
    pub fn get(&self, name: &str) -> Option<Arc<Collection>> {
        self.collections.read().get(name).cloned()
    }

    /// Sorted names of registered collections.
    pub fn list_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.collections.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Create and load a new collection. Fails with `Duplicate` if the name
    /// is already registered.
    pub async fn create(&self, name: &str) -> Result<Arc<Collection>, StoreError> {
        validate_name(name)?;
        let _guard = self.create_lock.lock().await;
        if self.get(name).is_some() {
            return Err(StoreError::Duplicate(name.to_string()));
        }
        self.create_locked(name).await
    }

    /// Existing collection, or a newly created one. Concurrent callers with
    /// the same name all get the same engine.
    pub async fn ensure_schema(&self, name: &str) -> Result<Arc<Collection>, StoreError> {
        if let Some(collection) = self.get(name) {
            return Ok(collection);
        }

        validate_name(name)?;
        let _guard = self.create_lock.lock().await;
        if let Some(collection) = self.get(name) {
            return Ok(collection);
        }
        self.create_locked(name).await
    }

    async fn create_locked(&self, name: &str) -> Result<Arc<Collection>, StoreError> {
        let collection = self.open(name)?;
        collection.load().await?;
        self.collections
            .write()
            .insert(name.to_string(), collection.clone());

        info!(collection = %name, "Created collection");
        self.emit(CollectionEvent::Created(name.to_string()));
        Ok(collection)
    }

    /// Destroy, unregister and delete a collection's files.
    pub async fn delete(&self, name: &str) -> Result<(), StoreError> {
        let collection = self
            .collections
            .write()
            .remove(name)
            .ok_or_else(|| StoreError::NotFound(format!("collection {}", name)))?;

        collection.destroy();
        collection.remove().await?;

        info!(collection = %name, "Deleted collection");
        self.emit(CollectionEvent::Deleted(name.to_string()));
        Ok(())
    }

    /// Destroy and unregister a collection, keeping its files. Pending
    /// unsaved changes are dropped; flush first to keep them.
    pub fn forget(&self, name: &str) -> Result<(), StoreError> {
        let collection = self
            .collections
            .write()
            .remove(name)
            .ok_or_else(|| StoreError::NotFound(format!("collection {}", name)))?;

        collection.destroy();
        debug!(collection = %name, "Forgot collection");
        self.emit(CollectionEvent::Forgotten(name.to_string()));
        Ok(())
    }

    /// Destroy every collection and wipe the data directory.
    pub async fn clear(&self) -> Result<(), StoreError> {
        let drained: Vec<_> = self.collections.write().drain().map(|(_, c)| c).collect();
        for collection in &drained {
            collection.destroy();
        }
        // Let in-flight saves finish before wiping
        for collection in &drained {
            collection.remove().await?;
        }
        self.fs.clear_directory(&self.config.root).await?;

        info!(root = ?self.config.root, "Cleared all collections");
        self.emit(CollectionEvent::Cleared);
        Ok(())
    }

    /// Search several collections with one vector and merge the hits by
    /// ascending distance.
    pub async fn find_in_collections(
        &self,
        names: &[&str],
        vector: &[f32],
        options: &SearchOptions,
    ) -> Result<Vec<CollectionHit>, StoreError> {
        let targets = names
            .iter()
            .map(|name| {
                self.get(name)
                    .ok_or_else(|| StoreError::NotFound(format!("collection {}", name)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let per_collection = try_join_all(targets.iter().map(|collection| async move {
            let hits = collection.find_by_vector(vector, options).await?;
            Ok::<_, StoreError>(
                hits.into_iter()
                    .map(|hit| CollectionHit {
                        collection: collection.name().to_string(),
                        hit,
                    })
                    .collect::<Vec<_>>(),
            )
        }))
        .await?;

        let mut merged: Vec<_> = per_collection.into_iter().flatten().collect();
        merged.sort_by(|a, b| a.hit.distance.total_cmp(&b.hit.distance));
        merged.truncate(options.limit());
        Ok(merged)
    }

    /// [`VectorDbClient::find_in_collections`] with one embedding of `text`.
    pub async fn find_text_in_collections(
        &self,
        names: &[&str],
        text: &str,
        options: &SearchOptions,
    ) -> Result<Vec<CollectionHit>, StoreError> {
        let vector = embed_text(self.embedder.as_ref(), text, options.cancel.as_ref()).await?;
        self.find_in_collections(names, &vector, options).await
    }

    /// Flush collections with unsaved changes, then destroy every engine.
    pub async fn shutdown(&self) -> Result<(), StoreError> {
        let collections: Vec<_> = self.collections.write().drain().map(|(_, c)| c).collect();
        let mut first_error = None;
        for collection in collections {
            if collection.stats().await.map(|s| s.save_pending).unwrap_or(true) {
                if let Err(e) = collection.flush().await {
                    warn!(collection = %collection.name(), error = %e, "Flush on shutdown failed");
                    first_error.get_or_insert(e);
                }
            }
            collection.destroy();
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
