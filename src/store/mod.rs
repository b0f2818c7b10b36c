//! Document store abstraction
//!
//! The core depends only on this capability set; backends are swappable.
//! Two implementations ship with the server: [`MongoStore`] for production
//! and [`MemoryStore`] for tests and dev mode.
//!
//! Documents are `bson::Document` values carrying a string `id` field.
//! Transactions buffer writes and commit all-or-nothing; reads inside a
//! transaction observe committed state (reads precede writes).

use bson::{Bson, Document};
use futures_util::future::BoxFuture;
use tokio::sync::mpsc;

use crate::types::Result;

pub mod memory;
pub mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

/// Field-level mutation operators, the only conditional-write primitives
/// the store offers besides full-document set.
#[derive(Debug, Clone)]
pub enum FieldOp {
    /// Set a field to a value
    Set(String, Bson),
    /// Remove a field
    Unset(String),
    /// Add a value to a set-valued array field, suppressing duplicates
    ArrayUnion(String, Bson),
    /// Remove a value from an array field
    ArrayRemove(String, Bson),
    /// Atomically add a signed delta to a numeric field
    Increment(String, i64),
}

/// A buffered write, used by transactions and batches.
#[derive(Debug, Clone)]
pub enum WriteOp {
    Set {
        collection: String,
        id: String,
        doc: Document,
    },
    Update {
        collection: String,
        id: String,
        ops: Vec<FieldOp>,
    },
    Delete {
        collection: String,
        id: String,
    },
}

/// Equality / array-membership query filter.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    conds: Vec<Cond>,
}

#[derive(Debug, Clone)]
enum Cond {
    Eq(String, Bson),
    ArrayContains(String, Bson),
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: &str, value: impl Into<Bson>) -> Self {
        self.conds.push(Cond::Eq(field.to_string(), value.into()));
        self
    }

    pub fn array_contains(mut self, field: &str, value: impl Into<Bson>) -> Self {
        self.conds
            .push(Cond::ArrayContains(field.to_string(), value.into()));
        self
    }

    /// Evaluate the filter against a document (memory store, change feeds).
    pub fn matches(&self, doc: &Document) -> bool {
        self.conds.iter().all(|cond| match cond {
            Cond::Eq(field, value) => doc.get(field) == Some(value),
            Cond::ArrayContains(field, value) => doc
                .get_array(field)
                .map(|arr| arr.contains(value))
                .unwrap_or(false),
        })
    }

    /// Render as a MongoDB filter document. Array membership uses the
    /// driver's native semantics: `{field: value}` matches arrays that
    /// contain the value.
    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        for cond in &self.conds {
            match cond {
                Cond::Eq(field, value) | Cond::ArrayContains(field, value) => {
                    doc.insert(field.clone(), value.clone());
                }
            }
        }
        doc
    }
}

/// Kind of change observed by a snapshot listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Added => "added",
            ChangeKind::Modified => "modified",
            ChangeKind::Removed => "removed",
        }
    }
}

/// A change observed on a watched collection, relative to the watch filter:
/// a document entering the filtered set is `Added`, changing within it is
/// `Modified`, leaving it (or being deleted) is `Removed`.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub collection: String,
    pub doc: Document,
}

/// Read/write handle inside a transaction. Writes are buffered and applied
/// atomically on commit; a body error discards them all.
#[async_trait::async_trait]
pub trait StoreTxn: Send {
    /// Read a document by id (committed state)
    async fn get(&mut self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Query documents by filter (committed state)
    async fn query(&mut self, collection: &str, filter: Filter) -> Result<Vec<Document>>;

    /// Buffer a full-document write
    fn set(&mut self, collection: &str, id: &str, doc: Document);

    /// Buffer a field-level update
    fn update(&mut self, collection: &str, id: &str, ops: Vec<FieldOp>);

    /// Buffer a delete
    fn delete(&mut self, collection: &str, id: &str);
}

/// Transaction body: borrows the transaction handle for the duration of
/// the closure's future.
pub type TxnBody = Box<dyn for<'t> FnOnce(&'t mut dyn StoreTxn) -> BoxFuture<'t, Result<()>> + Send>;

/// Capability set every storage backend must provide.
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read a single document by id
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Create or replace a document
    async fn set(&self, collection: &str, id: &str, doc: Document) -> Result<()>;

    /// Apply field-level updates to an existing document.
    /// Fails with `NotFound` when the document does not exist.
    async fn update(&self, collection: &str, id: &str, ops: Vec<FieldOp>) -> Result<()>;

    /// Delete a document (no-op when absent)
    async fn delete(&self, collection: &str, id: &str) -> Result<()>;

    /// Query documents by filter
    async fn query(&self, collection: &str, filter: Filter) -> Result<Vec<Document>>;

    /// Apply a group of writes. Callers must split batches at
    /// [`DocumentStore::batch_limit`].
    async fn batch(&self, writes: Vec<WriteOp>) -> Result<()>;

    /// Maximum writes per batch
    fn batch_limit(&self) -> usize {
        500
    }

    /// Run a transaction: reads then buffered writes, committed atomically.
    async fn run_transaction(&self, body: TxnBody) -> Result<()>;

    /// Subscribe to changes on a collection, restricted to documents
    /// matching the filter. The receiver yields an event per change until
    /// it is dropped.
    async fn watch(&self, collection: &str, filter: Filter) -> Result<mpsc::Receiver<ChangeEvent>>;
}

/// Apply a field op to a document in place (shared by the memory store and
/// the memory transaction commit path).
pub(crate) fn apply_field_op(doc: &mut Document, op: &FieldOp) {
    match op {
        FieldOp::Set(field, value) => {
            doc.insert(field.clone(), value.clone());
        }
        FieldOp::Unset(field) => {
            doc.remove(field);
        }
        FieldOp::ArrayUnion(field, value) => {
            let arr = match doc.get_mut(field) {
                Some(Bson::Array(arr)) => arr,
                _ => {
                    doc.insert(field.clone(), Bson::Array(Vec::new()));
                    match doc.get_mut(field) {
                        Some(Bson::Array(arr)) => arr,
                        _ => unreachable!(),
                    }
                }
            };
            if !arr.contains(value) {
                arr.push(value.clone());
            }
        }
        FieldOp::ArrayRemove(field, value) => {
            if let Some(Bson::Array(arr)) = doc.get_mut(field) {
                arr.retain(|v| v != value);
            }
        }
        FieldOp::Increment(field, delta) => {
            let current = match doc.get(field) {
                Some(Bson::Int64(n)) => *n,
                Some(Bson::Int32(n)) => i64::from(*n),
                Some(Bson::Double(n)) => *n as i64,
                _ => 0,
            };
            doc.insert(field.clone(), Bson::Int64(current + delta));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_filter_eq_and_array_contains() {
        let doc = doc! { "status": "pending", "children": ["a", "b"] };

        assert!(Filter::new().eq("status", "pending").matches(&doc));
        assert!(!Filter::new().eq("status", "approved").matches(&doc));
        assert!(Filter::new().array_contains("children", "a").matches(&doc));
        assert!(!Filter::new().array_contains("children", "c").matches(&doc));
        assert!(Filter::new()
            .eq("status", "pending")
            .array_contains("children", "b")
            .matches(&doc));
    }

    #[test]
    fn test_filter_missing_field_never_matches() {
        let doc = doc! { "name": "x" };
        assert!(!Filter::new().eq("status", "pending").matches(&doc));
        assert!(!Filter::new().array_contains("children", "a").matches(&doc));
    }

    #[test]
    fn test_apply_field_ops() {
        let mut doc = doc! { "name": "old", "children": ["a"], "likes_count": 1_i64 };

        apply_field_op(&mut doc, &FieldOp::Set("name".into(), "new".into()));
        assert_eq!(doc.get_str("name").unwrap(), "new");

        apply_field_op(&mut doc, &FieldOp::ArrayUnion("children".into(), "b".into()));
        apply_field_op(&mut doc, &FieldOp::ArrayUnion("children".into(), "a".into()));
        assert_eq!(doc.get_array("children").unwrap().len(), 2);

        apply_field_op(&mut doc, &FieldOp::ArrayRemove("children".into(), "a".into()));
        assert_eq!(doc.get_array("children").unwrap().len(), 1);

        apply_field_op(&mut doc, &FieldOp::Increment("likes_count".into(), -1));
        assert_eq!(doc.get_i64("likes_count").unwrap(), 0);

        apply_field_op(&mut doc, &FieldOp::Unset("name".into()));
        assert!(doc.get("name").is_none());
    }

    #[test]
    fn test_array_union_creates_missing_field() {
        let mut doc = doc! {};
        apply_field_op(&mut doc, &FieldOp::ArrayUnion("liked_by".into(), "u1".into()));
        assert_eq!(doc.get_array("liked_by").unwrap().len(), 1);
    }
}
