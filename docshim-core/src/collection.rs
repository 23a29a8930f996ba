//! Collection handles for document store operations.
//!
//! A [`CollectionHandle`] is a cheap, named view onto one collection of a
//! [`DatabaseClient`]. It validates every argument before dispatching it to the
//! backend, so malformed documents, filters, updates and pipelines never reach storage.
//!
//! # Collection Types
//!
//! - [`CollectionHandle`] - Untyped collection working with [`bson::Document`]s
//! - [`TypedCollection`] - Collection of a specific [`Record`] type
//!
//! # Example
//!
//! ```ignore
//! use docshim::prelude::*;
//! use bson::doc;
//!
//! let users = client.collection("users_data");
//! let id = users.insert_one(doc! { "name": "Alice", "age": 30 }).await?;
//! let alice = users.find_one(Filter::eq("_id", id)).await?;
//! ```

use bson::{Bson, Document};
use log::{debug, warn};
use std::marker::PhantomData;

use crate::{
    backend::StoreBackend,
    client::DatabaseClient,
    cursor::Cursor,
    document::{Record, RecordExt, ensure_id, validate_document},
    error::DocumentStoreResult,
    pipeline::Pipeline,
    query::{Expr, Query},
    results::{DeleteResult, InsertManyOutcome, InsertMode, UpdateResult, WriteScope},
    update::Update,
};

/// An untyped collection bound to a client.
///
/// # Type Parameters
///
/// * `'a` - Lifetime of the client reference
/// * `B` - The storage backend type
#[derive(Debug)]
pub struct CollectionHandle<'a, B: StoreBackend> {
    name: String,
    client: &'a DatabaseClient<B>,
}

impl<'a, B: StoreBackend> CollectionHandle<'a, B> {
    pub(crate) fn new(name: String, client: &'a DatabaseClient<B>) -> Self {
        Self { name, client }
    }

    /// Returns the name of this collection.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn backend(&self) -> DocumentStoreResult<&'a B> {
        self.client.ensure_connected()?;
        Ok(self.client.backend())
    }

    /// Inserts a single document, assigning an `_id` when it has none.
    ///
    /// # Arguments
    ///
    /// * `document` - The document to insert
    ///
    /// # Returns
    ///
    /// The identity of the stored document.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a malformed document, `DuplicateKey` when the identity is
    /// already stored, or `Connection` once the client has been disconnected.
    pub async fn insert_one(&self, mut document: Document) -> DocumentStoreResult<Bson> {
        let backend = self.backend()?;

        validate_document(&document).inspect_err(|err| warn!("rejected insert into {}: {err}", self.name))?;
        let id = ensure_id(&mut document);

        debug!("insert_one into {} (_id: {id})", self.name);

        backend
            .insert_documents(vec![document], InsertMode::AllOrNothing, &self.name)
            .await?;

        Ok(id)
    }

    /// Inserts a batch of documents, all or nothing.
    ///
    /// Every document is checked up front: if any is malformed or its identity collides
    /// with another document of the batch or with a stored document, nothing is inserted.
    ///
    /// # Returns
    ///
    /// The identities of the stored documents, in input order.
    pub async fn insert_many(&self, documents: Vec<Document>) -> DocumentStoreResult<Vec<Bson>> {
        let outcome = self
            .insert_many_with(documents, InsertMode::AllOrNothing)
            .await?;

        match outcome.failures.into_iter().next() {
            Some((_, err)) => Err(err),
            None => Ok(outcome.inserted_ids),
        }
    }

    /// Inserts a batch of documents with an explicit failure policy.
    ///
    /// In [`InsertMode::BestEffort`], malformed documents are reported as failures at their
    /// index and the rest of the batch is still attempted.
    pub async fn insert_many_with(
        &self,
        documents: Vec<Document>,
        mode: InsertMode,
    ) -> DocumentStoreResult<InsertManyOutcome> {
        let backend = self.backend()?;

        if documents.is_empty() {
            return Ok(InsertManyOutcome::default());
        }

        let mut prepared = Vec::with_capacity(documents.len());
        let mut positions = Vec::with_capacity(documents.len());
        let mut rejected = Vec::new();

        for (index, mut document) in documents.into_iter().enumerate() {
            match validate_document(&document) {
                Ok(()) => {
                    ensure_id(&mut document);
                    prepared.push(document);
                    positions.push(index);
                }
                Err(err) if mode == InsertMode::AllOrNothing => {
                    warn!("rejected batch insert into {} at index {index}: {err}", self.name);
                    return Err(err);
                }
                Err(err) => rejected.push((index, err)),
            }
        }

        debug!("insert_many into {} ({} documents, {mode:?})", self.name, prepared.len());

        let mut outcome = if prepared.is_empty() {
            InsertManyOutcome::default()
        } else {
            backend
                .insert_documents(prepared, mode, &self.name)
                .await?
        };

        // Backend failure indices refer to the prepared batch; map them back to input positions.
        for failure in &mut outcome.failures {
            failure.0 = positions.get(failure.0).copied().unwrap_or(failure.0);
        }

        outcome.failures.extend(rejected);
        outcome.failures.sort_by_key(|(index, _)| *index);

        Ok(outcome)
    }

    /// Finds the documents matching a query.
    ///
    /// # Arguments
    ///
    /// * `query` - The [`Query`] specifying filter, projection, sort keys, offset and limit.
    ///   A bare [`Expr`] converts into a query.
    ///
    /// # Returns
    ///
    /// A lazy [`Cursor`] over the matching documents.
    pub async fn find(&self, query: impl Into<Query>) -> DocumentStoreResult<Cursor> {
        let backend = self.backend()?;
        let query = query.into();

        query
            .validate()
            .inspect_err(|err| warn!("rejected find on {}: {err}", self.name))?;

        debug!("find on {}: {:?}", self.name, query.filter);

        Ok(Cursor::new(backend.find_documents(query, &self.name).await?))
    }

    /// Returns the first document matching `filter`, or `None` when nothing matches.
    pub async fn find_one(&self, filter: Expr) -> DocumentStoreResult<Option<Document>> {
        use futures::TryStreamExt;

        let query = Query::builder().filter(filter).limit(1).build();
        let mut cursor = self.find(query).await?;

        cursor.try_next().await
    }

    /// Applies `update` to the first document matching `filter`.
    pub async fn update_one(&self, filter: Expr, update: Update) -> DocumentStoreResult<UpdateResult> {
        self.update(filter, update, WriteScope::One).await
    }

    /// Applies `update` to every document matching `filter`.
    ///
    /// Either every matched document is updated or, when the update cannot be applied to
    /// one of them (for example an increment of a string field), none is.
    pub async fn update_many(&self, filter: Expr, update: Update) -> DocumentStoreResult<UpdateResult> {
        self.update(filter, update, WriteScope::Many).await
    }

    async fn update(&self, filter: Expr, update: Update, scope: WriteScope) -> DocumentStoreResult<UpdateResult> {
        let backend = self.backend()?;

        filter
            .validate()
            .and_then(|_| update.validate())
            .inspect_err(|err| warn!("rejected update on {}: {err}", self.name))?;

        debug!("update ({scope:?}) on {}: {filter:?}", self.name);

        backend
            .update_documents(filter, update, scope, &self.name)
            .await
    }

    /// Deletes the first document matching `filter`.
    pub async fn delete_one(&self, filter: Expr) -> DocumentStoreResult<DeleteResult> {
        self.delete(filter, WriteScope::One).await
    }

    /// Deletes every document matching `filter`.
    pub async fn delete_many(&self, filter: Expr) -> DocumentStoreResult<DeleteResult> {
        self.delete(filter, WriteScope::Many).await
    }

    /// Deletes every document of the collection.
    pub async fn delete_all(&self) -> DocumentStoreResult<DeleteResult> {
        self.delete(Expr::default(), WriteScope::Many).await
    }

    async fn delete(&self, filter: Expr, scope: WriteScope) -> DocumentStoreResult<DeleteResult> {
        let backend = self.backend()?;

        filter
            .validate()
            .inspect_err(|err| warn!("rejected delete on {}: {err}", self.name))?;

        debug!("delete ({scope:?}) on {}: {filter:?}", self.name);

        backend
            .delete_documents(filter, scope, &self.name)
            .await
    }

    /// Counts the documents matching `filter`.
    pub async fn count_documents(&self, filter: Expr) -> DocumentStoreResult<u64> {
        let backend = self.backend()?;

        filter.validate()?;
        debug!("count on {}: {filter:?}", self.name);

        backend.count_documents(filter, &self.name).await
    }

    /// Runs an aggregation pipeline over the collection.
    ///
    /// # Errors
    ///
    /// Returns `Validation` when a stage is malformed or when a stage fails at run time
    /// (for example arithmetic on a string). No partial results are produced.
    pub async fn aggregate(&self, pipeline: Pipeline) -> DocumentStoreResult<Cursor> {
        let backend = self.backend()?;

        pipeline
            .validate()
            .inspect_err(|err| warn!("rejected pipeline on {}: {err}", self.name))?;

        debug!("aggregate on {} ({} stages)", self.name, pipeline.stages().len());

        Ok(Cursor::new(backend.aggregate(pipeline, &self.name).await?))
    }
}

/// A collection of a specific [`Record`] type.
///
/// The collection name comes from [`Record::collection_name`]. Records are converted
/// with serde through their document form.
#[derive(Debug)]
pub struct TypedCollection<'a, B: StoreBackend, R: Record> {
    inner: CollectionHandle<'a, B>,
    _marker: PhantomData<R>,
}

impl<'a, B: StoreBackend, R: Record> TypedCollection<'a, B, R> {
    pub(crate) fn new(client: &'a DatabaseClient<B>) -> Self {
        Self {
            inner: CollectionHandle::new(R::collection_name().to_string(), client),
            _marker: PhantomData,
        }
    }

    /// Returns the untyped view of this collection.
    pub fn untyped(&self) -> &CollectionHandle<'a, B> {
        &self.inner
    }

    /// Inserts one record, returning its identity.
    pub async fn insert_one(&self, record: &R) -> DocumentStoreResult<Bson> {
        self.inner.insert_one(record.to_document()?).await
    }

    /// Inserts a batch of records, all or nothing.
    pub async fn insert_many(&self, records: &[R]) -> DocumentStoreResult<Vec<Bson>> {
        let documents = records
            .iter()
            .map(RecordExt::to_document)
            .collect::<DocumentStoreResult<Vec<_>>>()?;

        self.inner.insert_many(documents).await
    }

    /// Finds the records matching a query.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` when a stored document does not deserialize into `R`;
    /// projections that drop required fields will therefore fail here.
    pub async fn find(&self, query: impl Into<Query>) -> DocumentStoreResult<Vec<R>> {
        self.inner
            .find(query)
            .await?
            .try_collect_records()
            .await
    }

    /// Returns the first record matching `filter`.
    pub async fn find_one(&self, filter: Expr) -> DocumentStoreResult<Option<R>> {
        self.inner
            .find_one(filter)
            .await?
            .map(R::from_document)
            .transpose()
    }

    pub async fn update_one(&self, filter: Expr, update: Update) -> DocumentStoreResult<UpdateResult> {
        self.inner.update_one(filter, update).await
    }

    pub async fn update_many(&self, filter: Expr, update: Update) -> DocumentStoreResult<UpdateResult> {
        self.inner.update_many(filter, update).await
    }

    pub async fn delete_one(&self, filter: Expr) -> DocumentStoreResult<DeleteResult> {
        self.inner.delete_one(filter).await
    }

    pub async fn delete_many(&self, filter: Expr) -> DocumentStoreResult<DeleteResult> {
        self.inner.delete_many(filter).await
    }

    pub async fn delete_all(&self) -> DocumentStoreResult<DeleteResult> {
        self.inner.delete_all().await
    }

    pub async fn count_documents(&self, filter: Expr) -> DocumentStoreResult<u64> {
        self.inner.count_documents(filter).await
    }
}
