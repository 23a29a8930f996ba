//! Database client managing the connection lifecycle.
//!
//! A [`DatabaseClient`] owns one backend connection. It is created by
//! [`DatabaseClient::connect`], which verifies the backend is reachable, hands out
//! [`CollectionHandle`]s, and releases the connection with [`DatabaseClient::disconnect`].
//!
//! - [`DatabaseClient`] - Client bound to a specific backend implementation
//! - [`DynDatabaseClient`] - Client over a backend chosen at runtime
//!
//! # Example
//!
//! ```ignore
//! use docshim::client::DatabaseClient;
//!
//! let client = DatabaseClient::connect(backend).await?;
//! let users = client.collection("users_data");
//! // ...
//! client.disconnect().await?;
//! ```

use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::{
    backend::StoreBackend,
    collection::{CollectionHandle, TypedCollection},
    document::Record,
    error::{DocumentStoreError, DocumentStoreResult},
};

/// A connected client bound to a specific backend implementation.
///
/// # Type Parameters
///
/// * `B` - The backend implementation type
#[derive(Debug)]
pub struct DatabaseClient<B: StoreBackend> {
    backend: B,
    connected: AtomicBool,
}

/// A client whose backend was selected at runtime.
pub type DynDatabaseClient = DatabaseClient<Box<dyn crate::backend::DynStoreBackend>>;

impl<B: StoreBackend> DatabaseClient<B> {
    /// Connects through an already built backend, verifying it with a ping.
    ///
    /// # Errors
    ///
    /// Returns `Connection` when the ping fails. The backend is shut down before the
    /// error is returned.
    pub async fn connect(backend: B) -> DocumentStoreResult<Self> {
        if let Err(err) = backend.ping().await {
            warn!("connection check failed: {err}");

            if let Err(shutdown_err) = backend.shutdown().await {
                warn!("failed to release backend after connection check: {shutdown_err}");
            }

            return Err(match err {
                DocumentStoreError::Connection(_) => err,
                other => DocumentStoreError::Connection(other.to_string()),
            });
        }

        info!("connected to document store");

        Ok(Self {
            backend,
            connected: AtomicBool::new(true),
        })
    }

    /// Checks that the backend is still reachable.
    pub async fn ping(&self) -> DocumentStoreResult<()> {
        self.ensure_connected()?;
        self.backend.ping().await
    }

    /// Releases the backend connection.
    ///
    /// Calling this more than once is a no-op. After it returns, every operation on the
    /// client or its collection handles fails with `Connection`.
    pub async fn disconnect(&self) -> DocumentStoreResult<()> {
        if !self.connected.swap(false, Ordering::AcqRel) {
            debug!("disconnect called on a closed client");
            return Ok(());
        }

        info!("disconnecting from document store");
        self.backend.shutdown().await
    }

    /// Returns `true` until [`DatabaseClient::disconnect`] is called.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Returns a handle to the named collection. The collection need not exist yet.
    pub fn collection<'a>(&'a self, name: &str) -> CollectionHandle<'a, B> {
        CollectionHandle::new(name.to_string(), self)
    }

    /// Returns a typed handle to the collection of record type `R`.
    pub fn typed_collection<'a, R: Record>(&'a self) -> TypedCollection<'a, B, R> {
        TypedCollection::new(self)
    }

    /// Lists the names of all collections in the database.
    pub async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        self.ensure_connected()?;
        self.backend.list_collections().await
    }

    /// Drops a collection and all its documents.
    pub async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.ensure_connected()?;
        info!("dropping collection {name}");
        self.backend.drop_collection(name).await
    }

    /// Returns the underlying backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub(crate) fn ensure_connected(&self) -> DocumentStoreResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(DocumentStoreError::Connection("client is disconnected".to_string()))
        }
    }
}

impl<B: StoreBackend> Drop for DatabaseClient<B> {
    fn drop(&mut self) {
        if self.is_connected() {
            warn!("database client dropped without disconnect");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bson::Document;
    use futures::StreamExt;
    use std::sync::atomic::AtomicUsize;

    use crate::{
        backend::DocumentStream,
        pipeline::Pipeline,
        query::{Expr, Filter, Query},
        results::{DeleteResult, InsertManyOutcome, InsertMode, UpdateResult, WriteScope},
        update::Update,
    };

    #[derive(Debug, Default)]
    struct ProbeBackend {
        unreachable: bool,
        shutdowns: AtomicUsize,
    }

    #[async_trait]
    impl StoreBackend for ProbeBackend {
        async fn ping(&self) -> DocumentStoreResult<()> {
            if self.unreachable {
                Err(DocumentStoreError::Backend("no server at localhost:27017".to_string()))
            } else {
                Ok(())
            }
        }

        async fn insert_documents(
            &self,
            documents: Vec<Document>,
            _mode: InsertMode,
            _collection: &str,
        ) -> DocumentStoreResult<InsertManyOutcome> {
            Ok(InsertManyOutcome {
                inserted_ids: documents
                    .iter()
                    .filter_map(|document| document.get("_id").cloned())
                    .collect(),
                failures: Vec::new(),
            })
        }

        async fn find_documents(&self, _query: Query, _collection: &str) -> DocumentStoreResult<DocumentStream> {
            Ok(futures::stream::empty().boxed())
        }

        async fn update_documents(
            &self,
            _filter: Expr,
            _update: Update,
            _scope: WriteScope,
            _collection: &str,
        ) -> DocumentStoreResult<UpdateResult> {
            Ok(UpdateResult::default())
        }

        async fn delete_documents(
            &self,
            _filter: Expr,
            _scope: WriteScope,
            _collection: &str,
        ) -> DocumentStoreResult<DeleteResult> {
            Ok(DeleteResult::default())
        }

        async fn count_documents(&self, _filter: Expr, _collection: &str) -> DocumentStoreResult<u64> {
            Ok(0)
        }

        async fn aggregate(&self, _pipeline: Pipeline, _collection: &str) -> DocumentStoreResult<DocumentStream> {
            Ok(futures::stream::empty().boxed())
        }

        async fn drop_collection(&self, _name: &str) -> DocumentStoreResult<()> {
            Ok(())
        }

        async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
            Ok(Vec::new())
        }

        async fn shutdown(&self) -> DocumentStoreResult<()> {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn unreachable_backend_fails_with_connection_error() {
        let backend = ProbeBackend {
            unreachable: true,
            ..Default::default()
        };

        let err = DatabaseClient::connect(&backend).await.unwrap_err();

        assert!(matches!(err, DocumentStoreError::Connection(_)));
        assert_eq!(backend.shutdowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disconnect_shuts_down_once() {
        let client = DatabaseClient::connect(ProbeBackend::default()).await.unwrap();

        client.disconnect().await.unwrap();
        client.disconnect().await.unwrap();

        assert!(!client.is_connected());
        assert_eq!(client.backend().shutdowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn closed_client_rejects_operations() {
        let client = DatabaseClient::connect(ProbeBackend::default()).await.unwrap();
        let users = client.collection("users_data");

        users.insert_one(bson::doc! { "name": "Alice" }).await.unwrap();
        client.disconnect().await.unwrap();

        assert!(matches!(client.ping().await, Err(DocumentStoreError::Connection(_))));
        assert!(matches!(
            users.insert_one(bson::doc! { "name": "Bob" }).await,
            Err(DocumentStoreError::Connection(_))
        ));
        assert!(matches!(
            users.count_documents(Filter::all()).await,
            Err(DocumentStoreError::Connection(_))
        ));
    }

    #[tokio::test]
    async fn runtime_selected_backend_behaves_the_same() {
        let backend: Box<dyn crate::backend::DynStoreBackend> = Box::new(ProbeBackend::default());
        let client: DynDatabaseClient = DatabaseClient::connect(backend).await.unwrap();

        let id = client
            .collection("users_data")
            .insert_one(bson::doc! { "_id": 7, "name": "Alice" })
            .await
            .unwrap();

        assert_eq!(id, bson::Bson::Int32(7));
        client.disconnect().await.unwrap();
    }
}
