//! MongoDB-backed document store
//!
//! Documents are keyed by their string `id` field; a unique index per
//! collection enforces that. Transactions use driver sessions, change
//! feeds use change streams with update lookups.

use bson::{doc, Document};
use futures_util::StreamExt;
use mongodb::options::{FullDocumentType, IndexOptions};
use mongodb::{Client, ClientSession, Collection, Database, IndexModel};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::models;
use crate::types::{Result, RootlineError};

use super::{ChangeEvent, ChangeKind, DocumentStore, FieldOp, Filter, StoreTxn, TxnBody, WriteOp};

const WATCH_CHANNEL_CAPACITY: usize = 256;

/// MongoDB implementation of [`DocumentStore`]
#[derive(Clone)]
pub struct MongoStore {
    client: Client,
    db_name: String,
}

impl MongoStore {
    /// Connect and apply indexes.
    pub async fn new(uri: &str, db_name: &str) -> Result<Self> {
        info!("Connecting to MongoDB at {}", uri);

        // serverSelectionTimeoutMS avoids hanging on an unreachable server
        let timeout_uri = if uri.contains('?') {
            format!("{}&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        } else {
            format!("{}?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        };

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| RootlineError::Database(format!("Failed to connect to MongoDB: {}", e)))?;

        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| RootlineError::Database(format!("MongoDB ping failed: {}", e)))?;

        info!("Connected to MongoDB database '{}'", db_name);

        let store = Self {
            client,
            db_name: db_name.to_string(),
        };
        store.apply_indexes().await?;
        Ok(store)
    }

    fn db(&self) -> Database {
        self.client.database(&self.db_name)
    }

    fn coll(&self, name: &str) -> Collection<Document> {
        self.db().collection::<Document>(name)
    }

    /// Unique `id` index on every known collection, plus unique email on
    /// users.
    async fn apply_indexes(&self) -> Result<()> {
        for name in models::ALL_COLLECTIONS {
            let model = IndexModel::builder()
                .keys(doc! { "id": 1 })
                .options(
                    IndexOptions::builder()
                        .unique(true)
                        .name("id_unique".to_string())
                        .build(),
                )
                .build();
            self.coll(name)
                .create_index(model)
                .await
                .map_err(|e| RootlineError::Database(format!("Failed to create index: {}", e)))?;
        }

        let email_index = IndexModel::builder()
            .keys(doc! { "email": 1 })
            .options(
                IndexOptions::builder()
                    .unique(true)
                    .name("email_unique".to_string())
                    .build(),
            )
            .build();
        self.coll(models::USERS)
            .create_index(email_index)
            .await
            .map_err(|e| RootlineError::Database(format!("Failed to create index: {}", e)))?;

        Ok(())
    }

    async fn apply_write_in_session(
        &self,
        session: &mut ClientSession,
        op: WriteOp,
    ) -> Result<()> {
        match op {
            WriteOp::Set {
                collection,
                id,
                doc,
            } => {
                self.coll(&collection)
                    .replace_one(doc! { "id": id.as_str() }, doc)
                    .upsert(true)
                    .session(&mut *session)
                    .await?;
            }
            WriteOp::Update {
                collection,
                id,
                ops,
            } => {
                let update = field_ops_to_update(&ops);
                let result = self
                    .coll(&collection)
                    .update_one(doc! { "id": id.as_str() }, update)
                    .session(&mut *session)
                    .await?;
                if result.matched_count == 0 {
                    return Err(RootlineError::NotFound(format!(
                        "{}/{} does not exist",
                        collection, id
                    )));
                }
            }
            WriteOp::Delete { collection, id } => {
                self.coll(&collection)
                    .delete_one(doc! { "id": id.as_str() })
                    .session(&mut *session)
                    .await?;
            }
        }
        Ok(())
    }
}

/// Translate field ops into a MongoDB update document.
fn field_ops_to_update(ops: &[FieldOp]) -> Document {
    let mut set = Document::new();
    let mut unset = Document::new();
    let mut add_to_set = Document::new();
    let mut pull = Document::new();
    let mut inc = Document::new();

    for op in ops {
        match op {
            FieldOp::Set(field, value) => {
                set.insert(field.clone(), value.clone());
            }
            FieldOp::Unset(field) => {
                unset.insert(field.clone(), "");
            }
            FieldOp::ArrayUnion(field, value) => {
                add_to_set.insert(field.clone(), value.clone());
            }
            FieldOp::ArrayRemove(field, value) => {
                pull.insert(field.clone(), value.clone());
            }
            FieldOp::Increment(field, delta) => {
                inc.insert(field.clone(), *delta);
            }
        }
    }

    let mut update = Document::new();
    if !set.is_empty() {
        update.insert("$set", set);
    }
    if !unset.is_empty() {
        update.insert("$unset", unset);
    }
    if !add_to_set.is_empty() {
        update.insert("$addToSet", add_to_set);
    }
    if !pull.is_empty() {
        update.insert("$pull", pull);
    }
    if !inc.is_empty() {
        update.insert("$inc", inc);
    }
    update
}

struct MongoTxn<'s> {
    db: Database,
    session: &'s mut ClientSession,
    writes: Vec<WriteOp>,
}

#[async_trait::async_trait]
impl StoreTxn for MongoTxn<'_> {
    async fn get(&mut self, collection: &str, id: &str) -> Result<Option<Document>> {
        let doc = self
            .db
            .collection::<Document>(collection)
            .find_one(doc! { "id": id })
            .session(&mut *self.session)
            .await?;
        Ok(doc)
    }

    async fn query(&mut self, collection: &str, filter: Filter) -> Result<Vec<Document>> {
        let mut cursor = self
            .db
            .collection::<Document>(collection)
            .find(filter.to_document())
            .session(&mut *self.session)
            .await?;

        let mut results = Vec::new();
        while let Some(doc) = cursor.next(&mut *self.session).await {
            match doc {
                Ok(d) => results.push(d),
                Err(e) => {
                    error!("Error reading document in transaction: {}", e);
                }
            }
        }
        Ok(results)
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
impl DocumentStore for MongoStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        Ok(self.coll(collection).find_one(doc! { "id": id }).await?)
    }

    async fn set(&self, collection: &str, id: &str, doc: Document) -> Result<()> {
        self.coll(collection)
            .replace_one(doc! { "id": id }, doc)
            .upsert(true)
            .await?;
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, ops: Vec<FieldOp>) -> Result<()> {
        let update = field_ops_to_update(&ops);
        let result = self
            .coll(collection)
            .update_one(doc! { "id": id }, update)
            .await?;
        if result.matched_count == 0 {
            return Err(RootlineError::NotFound(format!(
                "{}/{} does not exist",
                collection, id
            )));
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        self.coll(collection).delete_one(doc! { "id": id }).await?;
        Ok(())
    }

    async fn query(&self, collection: &str, filter: Filter) -> Result<Vec<Document>> {
        let mut cursor = self.coll(collection).find(filter.to_document()).await?;

        let mut results = Vec::new();
        while let Some(doc) = cursor.next().await {
            match doc {
                Ok(d) => results.push(d),
                Err(e) => {
                    error!("Error reading document: {}", e);
                }
            }
        }
        Ok(results)
    }

    async fn batch(&self, writes: Vec<WriteOp>) -> Result<()> {
        for op in writes {
            match op {
                WriteOp::Set {
                    collection,
                    id,
                    doc,
                } => {
                    self.coll(&collection)
                        .replace_one(doc! { "id": id.as_str() }, doc)
                        .upsert(true)
                        .await?;
                }
                WriteOp::Update {
                    collection,
                    id,
                    ops,
                } => {
                    self.coll(&collection)
                        .update_one(doc! { "id": id.as_str() }, field_ops_to_update(&ops))
                        .await?;
                }
                WriteOp::Delete { collection, id } => {
                    self.coll(&collection).delete_one(doc! { "id": id.as_str() }).await?;
                }
            }
        }
        Ok(())
    }

    async fn run_transaction(&self, body: TxnBody) -> Result<()> {
        let mut session = self.client.start_session().await?;
        session.start_transaction().await?;

        let mut tx = MongoTxn {
            db: self.db(),
            session: &mut session,
            writes: Vec::new(),
        };

        let body_result = body(&mut tx).await;
        let writes = std::mem::take(&mut tx.writes);
        drop(tx);

        match body_result {
            Ok(()) => {
                for op in writes {
                    if let Err(e) = self.apply_write_in_session(&mut session, op).await {
                        let _ = session.abort_transaction().await;
                        return Err(e);
                    }
                }
                session.commit_transaction().await?;
                Ok(())
            }
            Err(e) => {
                let _ = session.abort_transaction().await;
                Err(e)
            }
        }
    }

    async fn watch(&self, collection: &str, filter: Filter) -> Result<mpsc::Receiver<ChangeEvent>> {
        let mut stream = self
            .coll(collection)
            .watch()
            .full_document(FullDocumentType::UpdateLookup)
            .await?;

        let (tx, rx) = mpsc::channel(WATCH_CHANNEL_CAPACITY);
        let collection = collection.to_string();

        tokio::spawn(async move {
            use mongodb::change_stream::event::OperationType;

            while let Some(event) = stream.next().await {
                let event = match event {
                    Ok(e) => e,
                    Err(e) => {
                        warn!(collection = %collection, "change stream error: {}", e);
                        break;
                    }
                };

                let change = match event.operation_type {
                    OperationType::Insert => {
                        let Some(doc) = event.full_document else { continue };
                        if !filter.matches(&doc) {
                            continue;
                        }
                        ChangeEvent {
                            kind: ChangeKind::Added,
                            collection: collection.clone(),
                            doc,
                        }
                    }
                    OperationType::Update | OperationType::Replace => {
                        let Some(doc) = event.full_document else { continue };
                        let kind = if filter.matches(&doc) {
                            ChangeKind::Modified
                        } else {
                            // The document left the filtered set
                            ChangeKind::Removed
                        };
                        ChangeEvent {
                            kind,
                            collection: collection.clone(),
                            doc,
                        }
                    }
                    OperationType::Delete => {
                        let Some(key) = event.document_key else { continue };
                        ChangeEvent {
                            kind: ChangeKind::Removed,
                            collection: collection.clone(),
                            doc: key,
                        }
                    }
                    _ => continue,
                };

                if tx.send(change).await.is_err() {
                    break;
                }
            }
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::Bson;

    // Store round-trips need a running MongoDB; the memory store covers the
    // trait semantics. These tests pin the update-document translation.

    #[test]
    fn test_field_ops_to_update() {
        let update = field_ops_to_update(&[
            FieldOp::Set("name".into(), Bson::from("x")),
            FieldOp::ArrayUnion("children".into(), Bson::from("c1")),
            FieldOp::ArrayRemove("liked_by".into(), Bson::from("u1")),
            FieldOp::Increment("likes_count".into(), -1),
            FieldOp::Unset("avatar".into()),
        ]);

        assert_eq!(
            update.get_document("$set").unwrap().get_str("name").unwrap(),
            "x"
        );
        assert!(update.get_document("$addToSet").unwrap().contains_key("children"));
        assert!(update.get_document("$pull").unwrap().contains_key("liked_by"));
        assert_eq!(
            update.get_document("$inc").unwrap().get_i64("likes_count").unwrap(),
            -1
        );
        assert!(update.get_document("$unset").unwrap().contains_key("avatar"));
    }

    #[test]
    fn test_empty_ops_produce_empty_update() {
        assert!(field_ops_to_update(&[]).is_empty());
    }
}
