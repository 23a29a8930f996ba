//! In-memory storage implementation for document stores.
//!
//! This module provides a simple in-memory backend that keeps every collection as an
//! insertion-ordered vector of documents behind an async-safe read-write lock.

use async_trait::async_trait;
use bson::{Bson, Document};
use futures::{StreamExt, stream};
use log::{debug, trace};
use mea::rwlock::RwLock;
use std::{collections::HashMap, sync::Arc};

use docshim_core::{
    backend::{DocumentStream, StoreBackend, StoreBackendBuilder},
    document::ID_FIELD,
    error::{DocumentStoreError, DocumentStoreResult},
    pipeline::Pipeline,
    query::{Expr, Query},
    results::{DeleteResult, InsertManyOutcome, InsertMode, UpdateResult, WriteScope},
    update::Update,
};

use crate::{
    aggregate::{PipelineExecutor, project, sort_documents},
    evaluator::{DocumentEvaluator, values_equal},
    update::apply_update,
};

type StoreMap = HashMap<String, Vec<Document>>;

/// Thread-safe in-memory document storage backend.
///
/// This struct implements the [`StoreBackend`] trait with MongoDB-compatible matching,
/// update and aggregation semantics, making it a drop-in test double for the MongoDB
/// backend.
///
/// # Thread Safety
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state, allowing
/// it to be safely shared across async tasks. Multiple clones of the same instance
/// share the same underlying data. Reads share the lock; every write holds it
/// exclusively for the whole call and computes its changes on copies before committing.
///
/// # Performance
///
/// Queries scan all documents in a collection (no indexing).
///
/// # Example
///
/// ```ignore
/// use docshim_memory::InMemoryStore;
/// use docshim::client::DatabaseClient;
/// use bson::doc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = DatabaseClient::connect(InMemoryStore::new()).await?;
///     let users = client.collection("users_data");
///
///     users.insert_one(doc! { "name": "Alice", "age": 30 }).await?;
///     assert_eq!(users.count_documents(Filter::all()).await?, 1);
///
///     client.disconnect().await?;
///     Ok(())
/// }
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    /// collection name -> documents in insertion order
    store: Arc<RwLock<StoreMap>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory document store.
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(StoreMap::new())),
        }
    }

    /// Creates a builder for constructing an `InMemoryStore`.
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }
}

fn into_stream(documents: Vec<Document>) -> DocumentStream {
    stream::iter(documents.into_iter().map(Ok)).boxed()
}

fn duplicate_key(id: &Bson, collection: &str) -> DocumentStoreError {
    DocumentStoreError::DuplicateKey {
        id: id.to_string(),
        collection: collection.to_string(),
    }
}

fn is_taken(stored: &[Document], id: &Bson) -> bool {
    stored
        .iter()
        .any(|document| document.get(ID_FIELD).is_some_and(|other| values_equal(other, id)))
}

fn document_id(document: &Document) -> DocumentStoreResult<&Bson> {
    document
        .get(ID_FIELD)
        .ok_or_else(|| DocumentStoreError::validation("document has no _id"))
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn ping(&self) -> DocumentStoreResult<()> {
        Ok(())
    }

    async fn insert_documents(
        &self,
        documents: Vec<Document>,
        mode: InsertMode,
        collection: &str,
    ) -> DocumentStoreResult<InsertManyOutcome> {
        let mut store = self.store.write().await;
        let existing = store
            .entry(collection.to_string())
            .or_default();

        let mut outcome = InsertManyOutcome::default();

        match mode {
            InsertMode::AllOrNothing => {
                for (index, document) in documents.iter().enumerate() {
                    let id = document_id(document)?;

                    if is_taken(existing, id) || is_taken(&documents[..index], id) {
                        return Err(duplicate_key(id, collection));
                    }
                }

                for document in documents {
                    outcome.inserted_ids.push(document_id(&document)?.clone());
                    existing.push(document);
                }
            }
            InsertMode::BestEffort => {
                for (index, document) in documents.into_iter().enumerate() {
                    let id = match document_id(&document) {
                        Ok(id) => id.clone(),
                        Err(err) => {
                            outcome.failures.push((index, err));
                            continue;
                        }
                    };

                    if is_taken(existing, &id) {
                        outcome.failures.push((index, duplicate_key(&id, collection)));
                        continue;
                    }

                    outcome.inserted_ids.push(id);
                    existing.push(document);
                }
            }
        }

        trace!("{collection}: inserted {} documents", outcome.inserted_ids.len());

        Ok(outcome)
    }

    async fn find_documents(&self, query: Query, collection: &str) -> DocumentStoreResult<DocumentStream> {
        let store = self.store.read().await;
        let documents = match store.get(collection) {
            Some(documents) => documents,
            None => return Ok(into_stream(Vec::new())),
        };

        let mut matched = DocumentEvaluator::filter_documents(documents, &query.filter)?;

        if !query.sort.is_empty() {
            sort_documents(&mut matched, &query.sort);
        }

        let page = matched
            .into_iter()
            .skip(query.offset.unwrap_or(0))
            .take(query.limit.unwrap_or(usize::MAX));

        let results = match &query.projection {
            Some(projection) => page
                .map(|document| project(&document, projection))
                .collect::<DocumentStoreResult<Vec<_>>>()?,
            None => page.collect(),
        };

        Ok(into_stream(results))
    }

    async fn update_documents(
        &self,
        filter: Expr,
        update: Update,
        scope: WriteScope,
        collection: &str,
    ) -> DocumentStoreResult<UpdateResult> {
        let mut store = self.store.write().await;
        let documents = match store.get_mut(collection) {
            Some(documents) => documents,
            None => return Ok(UpdateResult::default()),
        };

        let mut changes = Vec::new();

        for (index, document) in documents.iter().enumerate() {
            if !DocumentEvaluator::matches(document, &filter)? {
                continue;
            }

            changes.push((index, apply_update(document, &update)?));

            if scope == WriteScope::One {
                break;
            }
        }

        let mut result = UpdateResult {
            matched_count: changes.len() as u64,
            modified_count: 0,
        };

        for (index, updated) in changes {
            if documents[index] != updated {
                documents[index] = updated;
                result.modified_count += 1;
            }
        }

        debug!(
            "{collection}: matched {} and modified {} documents",
            result.matched_count, result.modified_count
        );

        Ok(result)
    }

    async fn delete_documents(
        &self,
        filter: Expr,
        scope: WriteScope,
        collection: &str,
    ) -> DocumentStoreResult<DeleteResult> {
        let mut store = self.store.write().await;
        let documents = match store.get_mut(collection) {
            Some(documents) => documents,
            None => return Ok(DeleteResult::default()),
        };

        let mut doomed = Vec::new();

        for (index, document) in documents.iter().enumerate() {
            if DocumentEvaluator::matches(document, &filter)? {
                doomed.push(index);

                if scope == WriteScope::One {
                    break;
                }
            }
        }

        for index in doomed.iter().rev() {
            documents.remove(*index);
        }

        debug!("{collection}: deleted {} documents", doomed.len());

        Ok(DeleteResult {
            deleted_count: doomed.len() as u64,
        })
    }

    async fn count_documents(&self, filter: Expr, collection: &str) -> DocumentStoreResult<u64> {
        let store = self.store.read().await;
        let documents = match store.get(collection) {
            Some(documents) => documents,
            None => return Ok(0),
        };

        let mut count = 0;

        for document in documents {
            if DocumentEvaluator::matches(document, &filter)? {
                count += 1;
            }
        }

        Ok(count)
    }

    async fn aggregate(&self, pipeline: Pipeline, collection: &str) -> DocumentStoreResult<DocumentStream> {
        let store = self.store.read().await;
        let input = store
            .get(collection)
            .cloned()
            .unwrap_or_default();

        let output = PipelineExecutor::new(&store).run(&pipeline, input)?;

        trace!("{collection}: pipeline produced {} documents", output.len());

        Ok(into_stream(output))
    }

    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.store.write().await.remove(name);

        Ok(())
    }

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        let mut names = self
            .store
            .read()
            .await
            .keys()
            .cloned()
            .collect::<Vec<_>>();

        names.sort();
        Ok(names)
    }
}

/// Builder for constructing [`InMemoryStore`] instances.
///
/// # Example
///
/// ```ignore
/// use docshim_memory::InMemoryStore;
/// use docshim::backend::StoreBackendBuilder;
///
/// #[tokio::main]
/// async fn main() {
///     let store = InMemoryStore::builder().build().await.unwrap();
/// }
/// ```
#[derive(Default)]
pub struct InMemoryStoreBuilder {
    seed: StoreMap,
}

impl InMemoryStoreBuilder {
    /// Pre-populates `collection` with `documents`, in order.
    pub fn with_documents(mut self, collection: impl Into<String>, documents: Vec<Document>) -> Self {
        self.seed
            .entry(collection.into())
            .or_default()
            .extend(documents);
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    /// Builds and returns a new [`InMemoryStore`] holding the seeded collections.
    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        Ok(InMemoryStore {
            store: Arc::new(RwLock::new(self.seed)),
        })
    }
}
