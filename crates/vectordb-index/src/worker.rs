//! Message-passing handle to an index living on its own thread.
//!
//! The worker thread owns the [`VectorIndex`] and drains a request queue in
//! FIFO order. Callers await a oneshot reply, so from the async side each
//! index call is an ordinary awaited operation.

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::error::VectorError;
use crate::index::{IndexStats, SearchResult, VectorIndex};

type Reply<T> = oneshot::Sender<Result<T, VectorError>>;

enum Request {
    AddPoint {
        label: u64,
        vector: Vec<f32>,
        reply: Reply<()>,
    },
    RemovePoint {
        label: u64,
        reply: Reply<bool>,
    },
    Search {
        query: Vec<f32>,
        k: usize,
        reply: Reply<Vec<SearchResult>>,
    },
    Load {
        bytes: Vec<u8>,
        reply: Reply<()>,
    },
    Save {
        reply: Reply<Vec<u8>>,
    },
    Stats {
        reply: oneshot::Sender<IndexStats>,
    },
}

/// Handle to an index worker thread.
pub struct AnnWorker {
    name: String,
    tx: Mutex<Option<mpsc::UnboundedSender<Request>>>,
}

impl AnnWorker {
    /// Spawn a worker thread that owns `index`.
    pub fn spawn(name: impl Into<String>, index: Box<dyn VectorIndex>) -> Result<Self, VectorError> {
        let name = name.into();
        let (tx, rx) = mpsc::unbounded_channel();

        std::thread::Builder::new()
            .name(format!("ann-{}", name))
            .spawn(move || run(index, rx))?;

        info!(worker = %name, "Spawned index worker");
        Ok(Self {
            name,
            tx: Mutex::new(Some(tx)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn send(&self, request: Request) -> Result<(), VectorError> {
        let guard = self.tx.lock();
        let tx = guard.as_ref().ok_or(VectorError::WorkerTerminated)?;
        tx.send(request).map_err(|_| VectorError::WorkerTerminated)
    }

    async fn call<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> Request,
    ) -> Result<T, VectorError> {
        let (reply, rx) = oneshot::channel();
        self.send(build(reply))?;
        rx.await.map_err(|_| VectorError::WorkerTerminated)?
    }

    /// Replace the index contents with an exported blob.
    pub async fn load(&self, bytes: Vec<u8>) -> Result<(), VectorError> {
        self.call(|reply| Request::Load { bytes, reply }).await
    }

    /// Export the whole index.
    pub async fn save(&self) -> Result<Vec<u8>, VectorError> {
        self.call(|reply| Request::Save { reply }).await
    }

    /// Insert or overwrite the vector stored under `label`.
    pub async fn add_point(&self, vector: Vec<f32>, label: u64) -> Result<(), VectorError> {
        self.call(|reply| Request::AddPoint {
            label,
            vector,
            reply,
        })
        .await
    }

    /// Remove the vector stored under `label`.
    pub async fn remove_point(&self, label: u64) -> Result<bool, VectorError> {
        self.call(|reply| Request::RemovePoint { label, reply }).await
    }

    /// k nearest neighbors, ascending distance.
    pub async fn search(&self, query: Vec<f32>, k: usize) -> Result<Vec<SearchResult>, VectorError> {
        self.call(|reply| Request::Search { query, k, reply }).await
    }

    pub async fn stats(&self) -> Result<IndexStats, VectorError> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::Stats { reply })?;
        rx.await.map_err(|_| VectorError::WorkerTerminated)
    }

    /// Stop accepting requests. Queued requests still complete; the thread
    /// exits once the queue drains.
    pub fn terminate(&self) {
        if self.tx.lock().take().is_some() {
            info!(worker = %self.name, "Terminated index worker");
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.tx.lock().is_none()
    }
}

impl Drop for AnnWorker {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn run(mut index: Box<dyn VectorIndex>, mut rx: mpsc::UnboundedReceiver<Request>) {
    while let Some(request) = rx.blocking_recv() {
        match request {
            Request::AddPoint {
                label,
                vector,
                reply,
            } => {
                let _ = reply.send(index.upsert(label, &vector));
            }
            Request::RemovePoint { label, reply } => {
                let _ = reply.send(index.remove(label));
            }
            Request::Search { query, k, reply } => {
                let _ = reply.send(index.search(&query, k));
            }
            Request::Load { bytes, reply } => {
                let _ = reply.send(index.import(&bytes));
            }
            Request::Save { reply } => {
                let _ = reply.send(index.export());
            }
            Request::Stats { reply } => {
                let _ = reply.send(index.stats());
            }
        }
    }
    if !index.is_empty() {
        debug!(vectors = index.len(), "Index worker exiting with live vectors");
    } else {
        debug!("Index worker exiting");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hnsw::{HnswConfig, HnswIndex};

    fn worker(dim: usize) -> AnnWorker {
        let index = HnswIndex::new(HnswConfig::new(dim)).unwrap();
        AnnWorker::spawn("test", Box::new(index)).unwrap()
    }

    fn axis(dim: usize, i: usize) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        v[i] = 1.0;
        v
    }

    #[tokio::test]
    async fn test_add_search_remove() {
        let worker = worker(8);
        for i in 0..4 {
            worker.add_point(axis(8, i), i as u64).await.unwrap();
        }

        let results = worker.search(axis(8, 3), 1).await.unwrap();
        assert_eq!(results[0].label, 3);

        assert!(worker.remove_point(3).await.unwrap());
        let results = worker.search(axis(8, 3), 4).await.unwrap();
        assert!(results.iter().all(|r| r.label != 3));
        assert_eq!(worker.stats().await.unwrap().vector_count, 3);
    }

    #[tokio::test]
    async fn test_save_and_load_between_workers() {
        let first = worker(8);
        first.add_point(axis(8, 1), 10).await.unwrap();
        first.add_point(axis(8, 2), 20).await.unwrap();
        let bytes = first.save().await.unwrap();

        let second = worker(8);
        second.load(bytes).await.unwrap();
        let results = second.search(axis(8, 2), 1).await.unwrap();
        assert_eq!(results[0].label, 20);
    }

    #[tokio::test]
    async fn test_errors_are_returned() {
        let worker = worker(8);
        let result = worker.add_point(vec![1.0; 3], 1).await;
        assert!(matches!(result, Err(VectorError::DimensionMismatch { .. })));
    }

    #[tokio::test]
    async fn test_terminate() {
        let worker = worker(8);
        worker.terminate();
        assert!(worker.is_terminated());
        let result = worker.search(axis(8, 0), 1).await;
        assert!(matches!(result, Err(VectorError::WorkerTerminated)));
    }

    #[tokio::test]
    async fn test_concurrent_distinct_labels() {
        let worker = std::sync::Arc::new(worker(8));
        let handles: Vec<_> = (0..32u64)
            .map(|label| {
                let worker = worker.clone();
                tokio::spawn(async move {
                    worker
                        .add_point(axis(8, (label % 8) as usize), label)
                        .await
                })
            })
            .collect();
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(worker.stats().await.unwrap().vector_count, 32);
    }
}
