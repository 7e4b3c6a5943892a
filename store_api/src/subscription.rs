use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::document::Document;
use crate::error::{StoreError, StoreResult};

pub type SubscriptionId = u64;

/// How a live query reports changes.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionMode {
    /// Every batch is the complete current result set.
    Snapshot,
    /// Every batch lists the documents added, modified or removed since the
    /// previous one. The first batch lists the initial results as added.
    Incremental,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DocumentChange {
    pub kind: ChangeKind,
    pub document: Document,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum ChangeBatch {
    Snapshot(Vec<Document>),
    Changes(Vec<DocumentChange>),
}

/// One delivery on a subscription channel. Errors do not end the subscription.
pub type SubscriptionEvent = Result<ChangeBatch, StoreError>;

/// Backend side of cancellation.
pub trait Unsubscribe: Send + Sync {
    fn unsubscribe(&self, id: SubscriptionId) -> StoreResult<()>;
}

/// Handle to a live query.
///
/// Batches are drained in the order the backend sent them. Once cancelled the
/// handle yields nothing more, including batches that were already buffered.
pub struct Subscription {
    id: SubscriptionId,
    mode: SubscriptionMode,
    rx: UnboundedReceiver<SubscriptionEvent>,
    backend: Arc<dyn Unsubscribe>,
    cancelled: bool,
}

impl Subscription {
    pub fn new(
        id: SubscriptionId,
        mode: SubscriptionMode,
        rx: UnboundedReceiver<SubscriptionEvent>,
        backend: Arc<dyn Unsubscribe>,
    ) -> Self {
        Self {
            id,
            mode,
            rx,
            backend,
            cancelled: false,
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn mode(&self) -> SubscriptionMode {
        self.mode
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Wait for the next batch. `None` once cancelled or when the backend
    /// dropped its sender.
    pub async fn next(&mut self) -> Option<SubscriptionEvent> {
        if self.cancelled {
            return None;
        }
        self.rx.recv().await
    }

    /// Take the next batch if one is already buffered.
    pub fn try_next(&mut self) -> Option<SubscriptionEvent> {
        if self.cancelled {
            return None;
        }
        self.rx.try_recv().ok()
    }

    /// Stop delivery and release the backend listener. A second call is a
    /// no-op. Local delivery stops even when the backend call fails.
    pub fn cancel(&mut self) -> StoreResult<()> {
        if self.cancelled {
            return Ok(());
        }
        self.cancelled = true;
        self.rx.close();
        while self.rx.try_recv().is_ok() {}
        self.backend.unsubscribe(self.id)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let _ = self.cancel();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("cancelled", &self.cancelled)
            .finish()
    }
}
