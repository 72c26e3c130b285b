//! Queue double that records what a driver inserts.

use messaging::{Queue, QueueItem};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

/// A [`Queue`] backed by an unbounded channel.
///
/// Tests await items with [`CollectingQueue::next_item`] instead of polling.
pub struct CollectingQueue {
    tx: mpsc::UnboundedSender<Box<dyn QueueItem>>,
    rx: Mutex<mpsc::UnboundedReceiver<Box<dyn QueueItem>>>,
}

impl CollectingQueue {
    pub fn new() -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            tx,
            rx: Mutex::new(rx),
        })
    }

    /// Wait up to `timeout` for the next inserted item.
    pub async fn next_item(&self, timeout: Duration) -> Option<Box<dyn QueueItem>> {
        let mut rx = self.rx.lock().await;
        tokio::time::timeout(timeout, rx.recv()).await.ok().flatten()
    }

    /// Collect every item inserted within `window`.
    pub async fn collect_for(&self, window: Duration) -> Vec<Box<dyn QueueItem>> {
        let deadline = tokio::time::Instant::now() + window;
        let mut rx = self.rx.lock().await;
        let mut items = Vec::new();

        while let Ok(Some(item)) = tokio::time::timeout_at(deadline, rx.recv()).await {
            items.push(item);
        }

        items
    }
}

impl Queue for CollectingQueue {
    fn insert(&self, item: Box<dyn QueueItem>) {
        // the receiver lives as long as self
        let _ = self.tx.send(item);
    }
}
