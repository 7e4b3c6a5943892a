use std::{
    collections::{BTreeMap, HashMap},
    path::{Path, PathBuf},
    sync::Arc,
};

use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::Value;
use store_api::{
    is_server_timestamp, ChangeBatch, ChangeKind, Document, DocumentChange, DocumentStore, Fields,
    Query, StoreError, StoreResult, Subscription, SubscriptionEvent, SubscriptionId,
    SubscriptionMode, Unsubscribe,
};
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tracing::{debug, info};
use uuid::Uuid;

use crate::persist::{self, Snapshot};

struct Watcher {
    query: Query,
    mode: SubscriptionMode,
    tx: UnboundedSender<SubscriptionEvent>,
    delivered: Vec<Document>,
}

/// Errors to return instead of performing the operation. Lets tests exercise
/// backend failures.
#[derive(Default)]
struct Faults {
    reads: Option<StoreError>,
    writes: Option<StoreError>,
    unsubscribe: Option<StoreError>,
}

#[derive(Default)]
struct State {
    collections: HashMap<String, BTreeMap<String, Fields>>,
    watchers: HashMap<SubscriptionId, Watcher>,
    next_subscription: SubscriptionId,
    last_timestamp: i64,
    writes: usize,
    faults: Faults,
}

enum WriteMode {
    Set,
    Merge,
}

impl State {
    fn docs(&self, collection: &str) -> Vec<Document> {
        self.collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Server clock. Strictly increasing so writes never share a timestamp.
    fn stamp(&mut self) -> i64 {
        let now = crate::now_millis().max(self.last_timestamp + 1);
        self.last_timestamp = now;
        now
    }

    fn resolve_server_timestamps(&mut self, fields: &mut Fields) {
        let mut stamp = None;
        for value in fields.values_mut() {
            if is_server_timestamp(value) {
                let ts = *stamp.get_or_insert_with(|| self.stamp());
                *value = Value::from(ts);
            }
        }
    }

    /// Apply a write without telling anyone. Returns the replaced value so
    /// the write can be undone if it cannot be persisted.
    fn stage(
        &mut self,
        collection: &str,
        id: &str,
        mut fields: Fields,
        mode: WriteMode,
    ) -> StoreResult<Option<Fields>> {
        if let Some(err) = self.faults.writes.clone() {
            return Err(err);
        }
        let exists = self
            .collections
            .get(collection)
            .map(|docs| docs.contains_key(id))
            .unwrap_or(false);
        if matches!(mode, WriteMode::Merge) && !exists {
            return Err(StoreError::NotFound {
                collection: collection.into(),
                id: id.into(),
            });
        }
        self.resolve_server_timestamps(&mut fields);
        let docs = self.collections.entry(collection.to_string()).or_default();
        let previous = docs.get(id).cloned();
        match mode {
            WriteMode::Set => {
                docs.insert(id.to_string(), fields);
            }
            WriteMode::Merge => {
                if let Some(existing) = docs.get_mut(id) {
                    existing.extend(fields);
                }
            }
        }
        Ok(previous)
    }

    fn commit(&mut self, collection: &str) {
        self.writes += 1;
        self.notify(collection);
    }

    fn rollback(&mut self, collection: &str, id: &str, previous: Option<Fields>) {
        let Some(docs) = self.collections.get_mut(collection) else {
            return;
        };
        match previous {
            Some(fields) => {
                docs.insert(id.to_string(), fields);
            }
            None => {
                docs.remove(id);
            }
        }
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            collections: self
                .collections
                .iter()
                .map(|(name, docs)| (name.clone(), docs.clone()))
                .collect(),
        }
    }

    /// Push the new result of every watcher on `collection` whose result
    /// changed. Watchers whose receiver is gone are dropped on the way.
    fn notify(&mut self, collection: &str) {
        let docs = self.docs(collection);
        self.watchers.retain(|id, w| {
            if w.query.collection != collection {
                return !w.tx.is_closed();
            }
            let result = w.query.evaluate(&docs);
            let batch = match w.mode {
                SubscriptionMode::Snapshot if result != w.delivered => {
                    Some(ChangeBatch::Snapshot(result.clone()))
                }
                SubscriptionMode::Snapshot => None,
                SubscriptionMode::Incremental => {
                    let changes = diff(&w.delivered, &result);
                    (!changes.is_empty()).then_some(ChangeBatch::Changes(changes))
                }
            };
            w.delivered = result;
            let open = match batch {
                Some(batch) => w.tx.send(Ok(batch)).is_ok(),
                None => !w.tx.is_closed(),
            };
            if !open {
                debug!(subscription = *id, "dropping closed subscription");
            }
            open
        });
    }
}

/// Changes that turn `prev` into `next`, in `next` order, removals last.
fn diff(prev: &[Document], next: &[Document]) -> Vec<DocumentChange> {
    let before: HashMap<&str, &Document> = prev.iter().map(|d| (d.id.as_str(), d)).collect();
    let mut changes = Vec::new();
    for doc in next {
        let kind = match before.get(doc.id.as_str()) {
            None => ChangeKind::Added,
            Some(old) if old.fields != doc.fields => ChangeKind::Modified,
            Some(_) => continue,
        };
        changes.push(DocumentChange {
            kind,
            document: doc.clone(),
        });
    }
    for doc in prev {
        if !next.iter().any(|d| d.id == doc.id) {
            changes.push(DocumentChange {
                kind: ChangeKind::Removed,
                document: doc.clone(),
            });
        }
    }
    changes
}

/// Document store kept in memory, optionally mirrored to a JSON file after
/// every write.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    file: Option<Arc<PathBuf>>,
    write_lock: Arc<tokio::sync::Mutex<()>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load documents from `path` (if it exists) and persist there on write.
    pub async fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let snapshot = persist::load(&path).await?;
        let store = Self {
            state: Arc::default(),
            file: Some(Arc::new(path)),
            write_lock: Arc::default(),
        };
        {
            let mut state = store.state.lock();
            let mut count = 0;
            for (name, docs) in snapshot.collections {
                count += docs.len();
                state.collections.insert(name, docs);
            }
            info!(documents = count, "loaded document snapshot");
        }
        Ok(store)
    }

    pub fn path(&self) -> Option<&Path> {
        self.file.as_deref().map(PathBuf::as_path)
    }

    pub fn snapshot(&self) -> Snapshot {
        self.state.lock().snapshot()
    }

    /// Write the current documents to the backing file, if any.
    pub async fn flush(&self) -> anyhow::Result<()> {
        if let Some(path) = &self.file {
            persist::save(path, &self.snapshot()).await?;
        }
        Ok(())
    }

    /// Every document of a collection, ordered by id.
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.state.lock().docs(collection)
    }

    /// Number of successful writes since creation.
    pub fn write_count(&self) -> usize {
        self.state.lock().writes
    }

    /// Number of live subscriptions held by the backend.
    pub fn watcher_count(&self) -> usize {
        self.state.lock().watchers.len()
    }

    pub fn fail_reads(&self, err: Option<StoreError>) {
        self.state.lock().faults.reads = err;
    }

    pub fn fail_writes(&self, err: Option<StoreError>) {
        self.state.lock().faults.writes = err;
    }

    pub fn fail_unsubscribe(&self, err: Option<StoreError>) {
        self.state.lock().faults.unsubscribe = err;
    }

    /// Deliver an error to every subscription on `collection`.
    pub fn push_error(&self, collection: &str, err: StoreError) {
        let state = self.state.lock();
        for w in state.watchers.values() {
            if w.query.collection == collection {
                let _ = w.tx.send(Err(err.clone()));
            }
        }
    }

    /// Stage the write, save the resulting snapshot, then publish it. A
    /// failed save undoes the write; nothing is counted or delivered.
    async fn write(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
        mode: WriteMode,
    ) -> StoreResult<()> {
        let _serial = self.write_lock.lock().await;
        let (previous, snapshot) = {
            let mut state = self.state.lock();
            let previous = state.stage(collection, id, fields, mode)?;
            let snapshot = self.file.as_ref().map(|_| state.snapshot());
            (previous, snapshot)
        };
        if let (Some(path), Some(snapshot)) = (&self.file, snapshot) {
            if let Err(e) = persist::save(path, &snapshot).await {
                self.state.lock().rollback(collection, id, previous);
                return Err(StoreError::Unavailable(format!("{e:#}")));
            }
        }
        self.state.lock().commit(collection);
        Ok(())
    }
}

impl Unsubscribe for MemoryStore {
    fn unsubscribe(&self, id: SubscriptionId) -> StoreResult<()> {
        let mut state = self.state.lock();
        if let Some(err) = state.faults.unsubscribe.clone() {
            return Err(err);
        }
        match state.watchers.remove(&id) {
            Some(_) => {
                debug!(subscription = id, "subscription closed");
                Ok(())
            }
            None => Err(StoreError::UnknownSubscription(id)),
        }
    }
}

impl DocumentStore for MemoryStore {
    fn query<'a>(&'a self, query: &'a Query) -> BoxFuture<'a, StoreResult<Vec<Document>>> {
        Box::pin(async move {
            let state = self.state.lock();
            if let Some(err) = state.faults.reads.clone() {
                return Err(err);
            }
            Ok(query.evaluate(&state.docs(&query.collection)))
        })
    }

    fn subscribe(&self, query: Query, mode: SubscriptionMode) -> StoreResult<Subscription> {
        let (tx, rx) = unbounded_channel();
        let id = {
            let mut state = self.state.lock();
            if let Some(err) = state.faults.reads.clone() {
                return Err(err);
            }
            state.next_subscription += 1;
            let id = state.next_subscription;
            let result = query.evaluate(&state.docs(&query.collection));
            let initial = match mode {
                SubscriptionMode::Snapshot => ChangeBatch::Snapshot(result.clone()),
                SubscriptionMode::Incremental => ChangeBatch::Changes(
                    result
                        .iter()
                        .map(|d| DocumentChange {
                            kind: ChangeKind::Added,
                            document: d.clone(),
                        })
                        .collect(),
                ),
            };
            let _ = tx.send(Ok(initial));
            state.watchers.insert(
                id,
                Watcher {
                    query,
                    mode,
                    tx,
                    delivered: result,
                },
            );
            id
        };
        debug!(subscription = id, ?mode, "subscription opened");
        Ok(Subscription::new(id, mode, rx, Arc::new(self.clone())))
    }

    fn add<'a>(
        &'a self,
        collection: &'a str,
        fields: Fields,
    ) -> BoxFuture<'a, StoreResult<String>> {
        Box::pin(async move {
            let id = Uuid::new_v4().simple().to_string();
            self.write(collection, &id, fields, WriteMode::Set).await?;
            Ok(id)
        })
    }

    fn set<'a>(
        &'a self,
        collection: &'a str,
        id: &'a str,
        fields: Fields,
    ) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            self.write(collection, id, fields, WriteMode::Set).await
        })
    }

    fn update<'a>(
        &'a self,
        collection: &'a str,
        id: &'a str,
        fields: Fields,
    ) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            self.write(collection, id, fields, WriteMode::Merge).await
        })
    }

    fn get<'a>(
        &'a self,
        collection: &'a str,
        id: &'a str,
    ) -> BoxFuture<'a, StoreResult<Option<Document>>> {
        Box::pin(async move {
            let state = self.state.lock();
            if let Some(err) = state.faults.reads.clone() {
                return Err(err);
            }
            Ok(state
                .collections
                .get(collection)
                .and_then(|docs| docs.get(id))
                .map(|fields| Document::new(id, fields.clone())))
        })
    }
}
