//! In-memory document store
//!
//! Backs tests and dev mode. A single async mutex serializes every
//! operation, which also gives transactions their atomicity: the lock is
//! held across the transaction body, so concurrent read-modify-write
//! sequences (likes, child linkage) cannot interleave. Transaction commits
//! stage onto a copy of the data and swap it in whole, so a failing write
//! never leaves a partial commit behind.

use std::collections::{BTreeMap, HashMap};

use bson::Document;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use crate::types::{Result, RootlineError};

use super::{
    apply_field_op, ChangeEvent, ChangeKind, DocumentStore, FieldOp, Filter, StoreTxn, TxnBody,
    WriteOp,
};

const WATCH_CHANNEL_CAPACITY: usize = 256;

type Collections = HashMap<String, BTreeMap<String, Document>>;

#[derive(Default)]
struct Inner {
    collections: Collections,
    watchers: Vec<Watcher>,
}

struct Watcher {
    collection: String,
    filter: Filter,
    tx: mpsc::Sender<ChangeEvent>,
}

/// In-memory implementation of [`DocumentStore`]
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn write_key(op: &WriteOp) -> (&str, &str) {
    match op {
        WriteOp::Set { collection, id, .. }
        | WriteOp::Update { collection, id, .. }
        | WriteOp::Delete { collection, id } => (collection, id),
    }
}

/// Apply one write to a collections map.
fn apply_to(collections: &mut Collections, op: &WriteOp) -> Result<()> {
    match op {
        WriteOp::Set {
            collection,
            id,
            doc,
        } => {
            collections
                .entry(collection.clone())
                .or_default()
                .insert(id.clone(), doc.clone());
        }
        WriteOp::Update {
            collection,
            id,
            ops,
        } => {
            let doc = collections
                .get_mut(collection)
                .and_then(|c| c.get_mut(id))
                .ok_or_else(|| {
                    RootlineError::NotFound(format!("{}/{} does not exist", collection, id))
                })?;
            for field_op in ops {
                apply_field_op(doc, field_op);
            }
        }
        WriteOp::Delete { collection, id } => {
            if let Some(coll) = collections.get_mut(collection) {
                coll.remove(id);
            }
        }
    }
    Ok(())
}

impl Inner {
    fn get_doc(&self, collection: &str, id: &str) -> Option<&Document> {
        self.collections.get(collection)?.get(id)
    }

    /// Apply one write and notify watchers of the transition.
    fn apply_write(&mut self, op: &WriteOp) -> Result<()> {
        let (collection, id) = write_key(op);
        let collection = collection.to_string();
        let before = self.get_doc(&collection, id).cloned();

        apply_to(&mut self.collections, op)?;

        let after = self.get_doc(&collection, id).cloned();
        self.notify(&collection, before.as_ref(), after.as_ref());
        Ok(())
    }

    fn notify(&mut self, collection: &str, before: Option<&Document>, after: Option<&Document>) {
        self.watchers.retain(|watcher| {
            if watcher.collection != collection {
                return true;
            }

            let was_in = before.map(|d| watcher.filter.matches(d)).unwrap_or(false);
            let is_in = after.map(|d| watcher.filter.matches(d)).unwrap_or(false);

            let event = match (was_in, is_in) {
                (false, true) => Some((ChangeKind::Added, after.unwrap().clone())),
                (true, true) => Some((ChangeKind::Modified, after.unwrap().clone())),
                (true, false) => {
                    Some((ChangeKind::Removed, after.or(before).unwrap().clone()))
                }
                (false, false) => None,
            };

            let Some((kind, doc)) = event else { return true };

            match watcher.tx.try_send(ChangeEvent {
                kind,
                collection: collection.to_string(),
                doc,
            }) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!(collection, "watch channel full, dropping change event");
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });
    }
}

struct MemTxn<'a> {
    inner: &'a mut Inner,
    writes: Vec<WriteOp>,
}

#[async_trait::async_trait]
impl StoreTxn for MemTxn<'_> {
    async fn get(&mut self, collection: &str, id: &str) -> Result<Option<Document>> {
        Ok(self.inner.get_doc(collection, id).cloned())
    }

    async fn query(&mut self, collection: &str, filter: Filter) -> Result<Vec<Document>> {
        Ok(self
            .inner
            .collections
            .get(collection)
            .map(|coll| {
                coll.values()
                    .filter(|doc| filter.matches(doc))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn set(&mut self, collection: &str, id: &str, doc: Document) {
        self.writes.push(WriteOp::Set {
            collection: collection.to_string(),
            id: id.to_string(),
            doc,
        });
    }

    fn update(&mut self, collection: &str, id: &str, ops: Vec<FieldOp>) {
        self.writes.push(WriteOp::Update {
            collection: collection.to_string(),
            id: id.to_string(),
            ops,
        });
    }

    fn delete(&mut self, collection: &str, id: &str) {
        self.writes.push(WriteOp::Delete {
            collection: collection.to_string(),
            id: id.to_string(),
        });
    }
}

#[async_trait::async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let inner = self.inner.lock().await;
        Ok(inner.get_doc(collection, id).cloned())
    }

    async fn set(&self, collection: &str, id: &str, doc: Document) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.apply_write(&WriteOp::Set {
            collection: collection.to_string(),
            id: id.to_string(),
            doc,
        })
    }

    async fn update(&self, collection: &str, id: &str, ops: Vec<FieldOp>) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.apply_write(&WriteOp::Update {
            collection: collection.to_string(),
            id: id.to_string(),
            ops,
        })
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.apply_write(&WriteOp::Delete {
            collection: collection.to_string(),
            id: id.to_string(),
        })
    }

    async fn query(&self, collection: &str, filter: Filter) -> Result<Vec<Document>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .collections
            .get(collection)
            .map(|coll| {
                coll.values()
                    .filter(|doc| filter.matches(doc))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn batch(&self, writes: Vec<WriteOp>) -> Result<()> {
        let mut inner = self.inner.lock().await;
        for op in &writes {
            inner.apply_write(op)?;
        }
        Ok(())
    }

    async fn run_transaction(&self, body: TxnBody) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let mut tx = MemTxn {
            inner: &mut inner,
            writes: Vec::new(),
        };

        body(&mut tx).await?;
        let writes = tx.writes;

        // Stage onto a copy so a failing write commits nothing, recording
        // each transition for watcher notification after the swap.
        let mut staged = inner.collections.clone();
        let mut transitions = Vec::with_capacity(writes.len());
        for op in &writes {
            let (collection, id) = write_key(op);
            let collection = collection.to_string();
            let before = staged.get(&collection).and_then(|c| c.get(id)).cloned();
            apply_to(&mut staged, op)?;
            let after = staged.get(&collection).and_then(|c| c.get(id)).cloned();
            transitions.push((collection, before, after));
        }

        inner.collections = staged;
        for (collection, before, after) in &transitions {
            inner.notify(collection, before.as_ref(), after.as_ref());
        }
        Ok(())
    }

    async fn watch(&self, collection: &str, filter: Filter) -> Result<mpsc::Receiver<ChangeEvent>> {
        let (tx, rx) = mpsc::channel(WATCH_CHANNEL_CAPACITY);
        let mut inner = self.inner.lock().await;
        inner.watchers.push(Watcher {
            collection: collection.to_string(),
            filter,
            tx,
        });
        Ok(rx)
    }
}
