//! Debounced snapshot scheduling.
//!
//! Every mutation calls [`SaveScheduler::trigger`]. The first trigger arms a
//! timer; triggers that arrive while the timer is armed only set a queued
//! flag. When the timer fires the target is saved once, and if anything was
//! queued meanwhile the timer is re-armed for one more round. Saves never
//! run more often than once per interval.

use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::StoreError;

/// Something the scheduler can persist.
#[async_trait]
pub trait SnapshotTarget: Send + Sync + 'static {
    /// Name used in log lines.
    fn label(&self) -> &str;

    async fn persist(&self) -> Result<(), StoreError>;
}

#[derive(Default)]
struct TimerState {
    armed: Option<CancellationToken>,
    queued: bool,
}

/// Timer plus queued flag for one snapshot target, and the queue that
/// serializes its saves.
pub struct SaveScheduler<T: SnapshotTarget> {
    target: Weak<T>,
    interval: Duration,
    state: Arc<Mutex<TimerState>>,
    save_queue: tokio::sync::Mutex<()>,
}

impl<T: SnapshotTarget> SaveScheduler<T> {
    pub fn new(interval: Duration, target: Weak<T>) -> Self {
        Self {
            target,
            interval,
            state: Arc::new(Mutex::new(TimerState::default())),
            save_queue: tokio::sync::Mutex::new(()),
        }
    }

    /// Request a save. Arms the timer, or marks a save as queued when the
    /// timer is already running.
    pub fn trigger(&self) {
        let mut state = self.state.lock();
        if state.armed.is_some() {
            state.queued = true;
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("No async runtime, snapshot save not scheduled");
            return;
        };

        let token = CancellationToken::new();
        state.armed = Some(token.clone());
        handle.spawn(run_timer(
            self.target.clone(),
            self.state.clone(),
            self.interval,
            token,
        ));
    }

    /// Disarm the timer and drop any queued save. A save that is already
    /// running is allowed to finish.
    pub fn cancel(&self) {
        let mut state = self.state.lock();
        state.queued = false;
        if let Some(token) = state.armed.take() {
            token.cancel();
            debug!("Cancelled pending snapshot save");
        }
    }

    /// True while a save is scheduled or queued.
    pub fn is_pending(&self) -> bool {
        let state = self.state.lock();
        state.armed.is_some() || state.queued
    }

    /// Run `fut` with the save queue held. At most one save per target is
    /// in flight; others wait their turn in arrival order.
    pub async fn exclusive<F: Future>(&self, fut: F) -> F::Output {
        let _turn = self.save_queue.lock().await;
        fut.await
    }
}

impl<T: SnapshotTarget> Drop for SaveScheduler<T> {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn run_timer<T: SnapshotTarget>(
    target: Weak<T>,
    state: Arc<Mutex<TimerState>>,
    interval: Duration,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(interval) => {}
        }

        let Some(target) = target.upgrade() else {
            let mut timer = state.lock();
            if !token.is_cancelled() {
                timer.armed = None;
                timer.queued = false;
            }
            return;
        };
        if let Err(e) = target.persist().await {
            warn!(target = %target.label(), error = %e, "Scheduled snapshot save failed");
        }
        drop(target);

        let mut timer = state.lock();
        if token.is_cancelled() {
            return;
        }
        if timer.queued {
            timer.queued = false;
            continue;
        }
        timer.armed = None;
        return;
    }
}
