//! Storage backend abstraction for the document store.
//!
//! This module defines the traits that abstract over different document databases,
//! allowing the client layer to run unchanged against an in-memory store in tests and
//! a real server in production.
//!
//! # Overview
//!
//! The [`StoreBackend`] trait provides a unified async interface for the CRUD contract
//! (insert, find, update, delete, count), aggregation pipelines and collection
//! management. Implementations are required to be thread-safe (`Send + Sync`).
//!
//! # Traits
//!
//! - [`StoreBackend`]: The core trait for storage backends
//! - [`DynStoreBackend`]: A trait for dynamic dispatch over backend implementations
//! - [`StoreBackendBuilder`]: Factory trait for creating backend instances
//!
//! # Examples
//!
//! ```ignore
//! use docshim::backend::StoreBackend;
//! use docshim::query::Query;
//!
//! let backend = MyBackendImpl::new();
//! backend.ping().await?;
//! let stream = backend.find_documents(Query::new(), "users").await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use async_trait::async_trait;
use bson::Document;
use futures::stream::BoxStream;
use std::{any::Any, fmt::Debug};

use crate::{
    error::DocumentStoreResult,
    pipeline::Pipeline,
    query::{Expr, Query},
    results::{DeleteResult, InsertManyOutcome, InsertMode, UpdateResult, WriteScope},
    update::Update,
};

/// A stream of documents produced by a `find` or `aggregate` call.
pub type DocumentStream = BoxStream<'static, DocumentStoreResult<Document>>;

/// Abstract interface for document storage backends.
///
/// Arguments reaching a backend have already been validated by the
/// [`CollectionHandle`](crate::collection::CollectionHandle): documents carry an `_id`
/// and valid field names, and filters, updates and pipelines pass their `validate` checks.
///
/// # Thread Safety
///
/// All implementations must be thread-safe and support concurrent access from multiple
/// async tasks. Each call must be atomic from the caller's point of view.
///
/// # Error Handling
///
/// Operations return [`DocumentStoreResult<T>`](crate::error::DocumentStoreResult).
/// Unreachable servers map to `Connection`, malformed input to `Validation`, identity
/// collisions to `DuplicateKey`, and other driver failures to `Backend`.
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Checks that the backend is reachable. Performs no mutation.
    async fn ping(&self) -> DocumentStoreResult<()>;

    /// Inserts documents into a collection, creating it on first write.
    ///
    /// # Arguments
    ///
    /// * `documents` - The documents to insert, each already carrying an `_id`
    /// * `mode` - Whether the batch is all-or-nothing or best-effort
    /// * `collection` - The name of the collection to insert into
    ///
    /// # Returns
    ///
    /// In [`InsertMode::AllOrNothing`] any failure is returned as an error and nothing is
    /// stored. In [`InsertMode::BestEffort`] the outcome lists the stored identities and the
    /// failures by input index.
    async fn insert_documents(
        &self,
        documents: Vec<Document>,
        mode: InsertMode,
        collection: &str,
    ) -> DocumentStoreResult<InsertManyOutcome>;

    /// Queries documents in a collection using a structured query.
    ///
    /// # Arguments
    ///
    /// * `query` - The [`Query`] specifying filter, projection, sort keys, offset and limit
    /// * `collection` - The name of the collection to query. A missing collection is empty.
    async fn find_documents(&self, query: Query, collection: &str) -> DocumentStoreResult<DocumentStream>;

    /// Applies an update to the first or every document matching `filter`.
    ///
    /// Either every selected document is updated or, on error, none is.
    async fn update_documents(
        &self,
        filter: Expr,
        update: Update,
        scope: WriteScope,
        collection: &str,
    ) -> DocumentStoreResult<UpdateResult>;

    /// Deletes the first or every document matching `filter`.
    async fn delete_documents(
        &self,
        filter: Expr,
        scope: WriteScope,
        collection: &str,
    ) -> DocumentStoreResult<DeleteResult>;

    /// Counts the documents matching `filter`.
    async fn count_documents(&self, filter: Expr, collection: &str) -> DocumentStoreResult<u64>;

    /// Runs an aggregation pipeline over a collection.
    ///
    /// A run-time failure in any stage fails the whole call; no partial results are produced.
    async fn aggregate(&self, pipeline: Pipeline, collection: &str) -> DocumentStoreResult<DocumentStream>;

    /// Drops (deletes) a collection and all its documents. Dropping a missing collection is a no-op.
    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()>;

    /// Lists the names of all collections in the store.
    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>>;

    /// Releases the backend's connections.
    ///
    /// Called at most once by [`DatabaseClient::disconnect`](crate::client::DatabaseClient::disconnect).
    /// The default implementation is a no-op.
    async fn shutdown(&self) -> DocumentStoreResult<()> {
        Ok(())
    }
}

#[async_trait]
impl<B> StoreBackend for &B
where
    B: StoreBackend,
{
    async fn ping(&self) -> DocumentStoreResult<()> {
        StoreBackend::ping(*self).await
    }

    async fn insert_documents(
        &self,
        documents: Vec<Document>,
        mode: InsertMode,
        collection: &str,
    ) -> DocumentStoreResult<InsertManyOutcome> {
        StoreBackend::insert_documents(*self, documents, mode, collection)
            .await
    }

    async fn find_documents(&self, query: Query, collection: &str) -> DocumentStoreResult<DocumentStream> {
        StoreBackend::find_documents(*self, query, collection).await
    }

    async fn update_documents(
        &self,
        filter: Expr,
        update: Update,
        scope: WriteScope,
        collection: &str,
    ) -> DocumentStoreResult<UpdateResult> {
        StoreBackend::update_documents(*self, filter, update, scope, collection)
            .await
    }

    async fn delete_documents(
        &self,
        filter: Expr,
        scope: WriteScope,
        collection: &str,
    ) -> DocumentStoreResult<DeleteResult> {
        StoreBackend::delete_documents(*self, filter, scope, collection)
            .await
    }

    async fn count_documents(&self, filter: Expr, collection: &str) -> DocumentStoreResult<u64> {
        StoreBackend::count_documents(*self, filter, collection).await
    }

    async fn aggregate(&self, pipeline: Pipeline, collection: &str) -> DocumentStoreResult<DocumentStream> {
        StoreBackend::aggregate(*self, pipeline, collection).await
    }

    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        StoreBackend::drop_collection(*self, name).await
    }

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        StoreBackend::list_collections(*self).await
    }

    async fn shutdown(&self) -> DocumentStoreResult<()> {
        StoreBackend::shutdown(*self).await
    }
}

/// Object-safe mirror of [`StoreBackend`], implemented for every backend.
///
/// A `Box<dyn DynStoreBackend>` is itself a [`StoreBackend`], which lets the backend be
/// chosen at runtime (for example from the connection URI scheme).
#[async_trait]
pub trait DynStoreBackend: Send + Sync + Debug {
    async fn ping(&self) -> DocumentStoreResult<()>;
    async fn insert_documents(
        &self,
        documents: Vec<Document>,
        mode: InsertMode,
        collection: &str,
    ) -> DocumentStoreResult<InsertManyOutcome>;
    async fn find_documents(&self, query: Query, collection: &str) -> DocumentStoreResult<DocumentStream>;
    async fn update_documents(
        &self,
        filter: Expr,
        update: Update,
        scope: WriteScope,
        collection: &str,
    ) -> DocumentStoreResult<UpdateResult>;
    async fn delete_documents(
        &self,
        filter: Expr,
        scope: WriteScope,
        collection: &str,
    ) -> DocumentStoreResult<DeleteResult>;
    async fn count_documents(&self, filter: Expr, collection: &str) -> DocumentStoreResult<u64>;
    async fn aggregate(&self, pipeline: Pipeline, collection: &str) -> DocumentStoreResult<DocumentStream>;
    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()>;
    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>>;
    async fn shutdown_dyn(&self) -> DocumentStoreResult<()>;

    fn as_any(&self) -> &dyn Any;
}

#[async_trait]
impl<B: StoreBackend + 'static> DynStoreBackend for B {
    async fn ping(&self) -> DocumentStoreResult<()> {
        StoreBackend::ping(self).await
    }

    async fn insert_documents(
        &self,
        documents: Vec<Document>,
        mode: InsertMode,
        collection: &str,
    ) -> DocumentStoreResult<InsertManyOutcome> {
        StoreBackend::insert_documents(self, documents, mode, collection).await
    }

    async fn find_documents(&self, query: Query, collection: &str) -> DocumentStoreResult<DocumentStream> {
        StoreBackend::find_documents(self, query, collection).await
    }

    async fn update_documents(
        &self,
        filter: Expr,
        update: Update,
        scope: WriteScope,
        collection: &str,
    ) -> DocumentStoreResult<UpdateResult> {
        StoreBackend::update_documents(self, filter, update, scope, collection).await
    }

    async fn delete_documents(
        &self,
        filter: Expr,
        scope: WriteScope,
        collection: &str,
    ) -> DocumentStoreResult<DeleteResult> {
        StoreBackend::delete_documents(self, filter, scope, collection).await
    }

    async fn count_documents(&self, filter: Expr, collection: &str) -> DocumentStoreResult<u64> {
        StoreBackend::count_documents(self, filter, collection).await
    }

    async fn aggregate(&self, pipeline: Pipeline, collection: &str) -> DocumentStoreResult<DocumentStream> {
        StoreBackend::aggregate(self, pipeline, collection).await
    }

    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        StoreBackend::drop_collection(self, name).await
    }

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        StoreBackend::list_collections(self).await
    }

    async fn shutdown_dyn(&self) -> DocumentStoreResult<()> {
        StoreBackend::shutdown(self).await
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[async_trait]
impl StoreBackend for Box<dyn DynStoreBackend> {
    async fn ping(&self) -> DocumentStoreResult<()> {
        DynStoreBackend::ping(&**self).await
    }

    async fn insert_documents(
        &self,
        documents: Vec<Document>,
        mode: InsertMode,
        collection: &str,
    ) -> DocumentStoreResult<InsertManyOutcome> {
        DynStoreBackend::insert_documents(&**self, documents, mode, collection)
            .await
    }

    async fn find_documents(&self, query: Query, collection: &str) -> DocumentStoreResult<DocumentStream> {
        DynStoreBackend::find_documents(&**self, query, collection).await
    }

    async fn update_documents(
        &self,
        filter: Expr,
        update: Update,
        scope: WriteScope,
        collection: &str,
    ) -> DocumentStoreResult<UpdateResult> {
        DynStoreBackend::update_documents(&**self, filter, update, scope, collection)
            .await
    }

    async fn delete_documents(
        &self,
        filter: Expr,
        scope: WriteScope,
        collection: &str,
    ) -> DocumentStoreResult<DeleteResult> {
        DynStoreBackend::delete_documents(&**self, filter, scope, collection)
            .await
    }

    async fn count_documents(&self, filter: Expr, collection: &str) -> DocumentStoreResult<u64> {
        DynStoreBackend::count_documents(&**self, filter, collection).await
    }

    async fn aggregate(&self, pipeline: Pipeline, collection: &str) -> DocumentStoreResult<DocumentStream> {
        DynStoreBackend::aggregate(&**self, pipeline, collection).await
    }

    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        DynStoreBackend::drop_collection(&**self, name).await
    }

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        DynStoreBackend::list_collections(&**self).await
    }

    async fn shutdown(&self) -> DocumentStoreResult<()> {
        DynStoreBackend::shutdown_dyn(&**self).await
    }
}

#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> DocumentStoreResult<Self::Backend>;
}
