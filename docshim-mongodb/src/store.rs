use async_trait::async_trait;
use bson::{Bson, Document, doc};
use futures::{StreamExt, TryStreamExt};
use log::{debug, info};
use mongodb::{
    Client, Collection as MongoCollection,
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::{ClientOptions, FindOptions},
};

use docshim_core::{
    backend::{DocumentStream, StoreBackend, StoreBackendBuilder},
    config::ClientConfig,
    document::ID_FIELD,
    error::{DocumentStoreError, DocumentStoreResult},
    pipeline::Pipeline,
    query::{Expr, Query},
    results::{DeleteResult, InsertManyOutcome, InsertMode, UpdateResult, WriteScope},
    update::Update,
};

use crate::{
    query::MongoQueryTranslator,
    translate::{pipeline_documents, projection_document, sort_document, update_document},
};

const DUPLICATE_KEY_CODE: i32 = 11000;

/// Maps a driver error onto the store's error kinds.
fn map_error(err: MongoError, collection: &str, id: Option<&Bson>) -> DocumentStoreError {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) if write_error.code == DUPLICATE_KEY_CODE => {
            DocumentStoreError::DuplicateKey {
                id: id.map(ToString::to_string).unwrap_or_default(),
                collection: collection.to_string(),
            }
        }
        ErrorKind::Io(_) | ErrorKind::ServerSelection { .. } => DocumentStoreError::Connection(err.to_string()),
        _ => DocumentStoreError::Backend(err.to_string()),
    }
}

fn backend_error(err: MongoError) -> DocumentStoreError {
    DocumentStoreError::Backend(err.to_string())
}

fn document_id(document: &Document) -> DocumentStoreResult<&Bson> {
    document
        .get(ID_FIELD)
        .ok_or_else(|| DocumentStoreError::validation("document has no _id"))
}

/// Document store backed by a MongoDB database.
///
/// The driver's client is internally pooled and reference counted, so the store can be
/// shared across tasks. Filters, updates and pipelines are translated into MongoDB syntax
/// and executed by the server.
#[derive(Debug)]
pub struct MongoDbStore {
    client: Client,
    database: String,
}

impl MongoDbStore {
    pub fn new(client: Client, database: String) -> Self {
        Self { client, database }
    }

    pub fn builder(config: ClientConfig) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(config)
    }

    fn get_collection(&self, collection_name: &str) -> MongoCollection<Document> {
        self.client
            .database(&self.database)
            .collection(collection_name)
    }

    /// Fails with `DuplicateKey` if any `_id` of the batch is already stored or repeated
    /// within the batch.
    async fn check_unique_ids(&self, documents: &[Document], collection: &str) -> DocumentStoreResult<()> {
        let ids = documents
            .iter()
            .map(|document| document_id(document).cloned())
            .collect::<DocumentStoreResult<Vec<_>>>()?;

        for (index, id) in ids.iter().enumerate() {
            if ids[..index].contains(id) {
                return Err(DocumentStoreError::DuplicateKey {
                    id: id.to_string(),
                    collection: collection.to_string(),
                });
            }
        }

        let taken = self
            .get_collection(collection)
            .find_one(doc! { ID_FIELD: { "$in": ids } })
            .await
            .map_err(|e| map_error(e, collection, None))?;

        match taken {
            Some(existing) => Err(DocumentStoreError::DuplicateKey {
                id: existing.get(ID_FIELD).map(ToString::to_string).unwrap_or_default(),
                collection: collection.to_string(),
            }),
            None => Ok(()),
        }
    }

    fn into_stream<S>(cursor: S) -> DocumentStream
    where
        S: futures::Stream<Item = Result<Document, MongoError>> + Send + 'static,
    {
        cursor.map_err(backend_error).boxed()
    }
}

#[async_trait]
impl StoreBackend for MongoDbStore {
    async fn ping(&self) -> DocumentStoreResult<()> {
        self.client
            .database(&self.database)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| DocumentStoreError::Connection(e.to_string()))?;

        Ok(())
    }

    async fn insert_documents(
        &self,
        documents: Vec<Document>,
        mode: InsertMode,
        collection: &str,
    ) -> DocumentStoreResult<InsertManyOutcome> {
        let mut outcome = InsertManyOutcome::default();

        match mode {
            InsertMode::AllOrNothing => {
                self.check_unique_ids(&documents, collection).await?;

                outcome.inserted_ids = documents
                    .iter()
                    .map(|document| document_id(document).cloned())
                    .collect::<DocumentStoreResult<Vec<_>>>()?;

                self.get_collection(collection)
                    .insert_many(documents)
                    .await
                    .map_err(|e| map_error(e, collection, None))?;
            }
            InsertMode::BestEffort => {
                let target = self.get_collection(collection);

                for (index, document) in documents.into_iter().enumerate() {
                    let id = document.get(ID_FIELD).cloned();

                    match target.insert_one(document).await {
                        Ok(result) => outcome.inserted_ids.push(result.inserted_id),
                        Err(err) => outcome.failures.push((index, map_error(err, collection, id.as_ref()))),
                    }
                }
            }
        }

        debug!("{collection}: inserted {} documents", outcome.inserted_ids.len());

        Ok(outcome)
    }

    async fn find_documents(&self, query: Query, collection: &str) -> DocumentStoreResult<DocumentStream> {
        let mut options = FindOptions::default();

        if let Some(limit) = query.limit {
            options.limit = Some(i64::try_from(limit).unwrap_or(i64::MAX));
        }
        if let Some(skip) = query.offset {
            options.skip = Some(skip as u64);
        }
        if !query.sort.is_empty() {
            options.sort = Some(sort_document(&query.sort));
        }
        if let Some(projection) = &query.projection {
            options.projection = Some(projection_document(projection));
        }

        let cursor = self
            .get_collection(collection)
            .find(MongoQueryTranslator::translate(&query.filter)?)
            .with_options(options)
            .await
            .map_err(|e| map_error(e, collection, None))?;

        Ok(Self::into_stream(cursor))
    }

    async fn update_documents(
        &self,
        filter: Expr,
        update: Update,
        scope: WriteScope,
        collection: &str,
    ) -> DocumentStoreResult<UpdateResult> {
        let filter = MongoQueryTranslator::translate(&filter)?;
        let update = update_document(&update);
        let target = self.get_collection(collection);

        let result = match scope {
            WriteScope::One => target.update_one(filter, update).await,
            WriteScope::Many => target.update_many(filter, update).await,
        }
        .map_err(|e| map_error(e, collection, None))?;

        Ok(UpdateResult {
            matched_count: result.matched_count,
            modified_count: result.modified_count,
        })
    }

    async fn delete_documents(
        &self,
        filter: Expr,
        scope: WriteScope,
        collection: &str,
    ) -> DocumentStoreResult<DeleteResult> {
        let filter = MongoQueryTranslator::translate(&filter)?;
        let target = self.get_collection(collection);

        let result = match scope {
            WriteScope::One => target.delete_one(filter).await,
            WriteScope::Many => target.delete_many(filter).await,
        }
        .map_err(|e| map_error(e, collection, None))?;

        Ok(DeleteResult {
            deleted_count: result.deleted_count,
        })
    }

    async fn count_documents(&self, filter: Expr, collection: &str) -> DocumentStoreResult<u64> {
        self.get_collection(collection)
            .count_documents(MongoQueryTranslator::translate(&filter)?)
            .await
            .map_err(|e| map_error(e, collection, None))
    }

    async fn aggregate(&self, pipeline: Pipeline, collection: &str) -> DocumentStoreResult<DocumentStream> {
        let cursor = self
            .get_collection(collection)
            .aggregate(pipeline_documents(&pipeline)?)
            .await
            .map_err(|e| map_error(e, collection, None))?;

        Ok(Self::into_stream(cursor))
    }

    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.get_collection(name)
            .drop()
            .await
            .map_err(|e| map_error(e, name, None))?;

        Ok(())
    }

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        let mut names = self
            .client
            .database(&self.database)
            .list_collection_names()
            .await
            .map_err(backend_error)?;

        names.sort();
        Ok(names)
    }

    async fn shutdown(&self) -> DocumentStoreResult<()> {
        info!("closing MongoDB connection pool");
        self.client.clone().shutdown().await;

        Ok(())
    }
}

/// Builder for constructing [`MongoDbStore`] instances from a [`ClientConfig`].
pub struct MongoDbStoreBuilder {
    config: ClientConfig,
}

impl MongoDbStoreBuilder {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl StoreBackendBuilder for MongoDbStoreBuilder {
    type Backend = MongoDbStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        let mut options = ClientOptions::parse(&self.config.uri)
            .await
            .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?;

        if let Some(timeout) = self.config.connect_timeout() {
            options.connect_timeout = Some(timeout);
        }
        if let Some(timeout) = self.config.server_selection_timeout() {
            options.server_selection_timeout = Some(timeout);
        }

        Ok(MongoDbStore::new(
            Client::with_options(options).map_err(|e| DocumentStoreError::Initialization(e.to_string()))?,
            self.config.database,
        ))
    }
}
