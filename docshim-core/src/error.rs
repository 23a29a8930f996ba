//! Error types and result types for document store operations.
//!
//! This module provides the error taxonomy shared by every backend.
//! Use [`DocumentStoreResult<T>`] as the return type for fallible operations.
//!
//! A single-document read that finds nothing is not an error: it is reported
//! as `Ok(None)` by [`CollectionHandle::find_one`](crate::collection::CollectionHandle::find_one).

use bson::error::Error as BsonError;
use thiserror::Error;

/// Represents all possible errors that can occur when interacting with a document store.
#[derive(Error, Debug)]
pub enum DocumentStoreError {
    /// The backend could not be reached, or the client has already been disconnected.
    #[error("Connection error: {0}")]
    Connection(String),
    /// A document, filter, update or pipeline stage is malformed.
    ///
    /// Validation failures never leave a collection partially modified.
    #[error("Validation error: {0}")]
    Validation(String),
    /// A document with the given identity already exists in the collection.
    #[error("Duplicate key {id} in collection {collection}")]
    DuplicateKey {
        /// Display form of the colliding `_id` value.
        id: String,
        /// The collection the insert targeted.
        collection: String,
    },
    /// Serialization/deserialization error when converting between records and BSON documents.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error during backend construction or configuration loading.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// The requested collection does not exist in the store.
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),
    /// An error occurred in the underlying storage backend.
    #[error("Backend error: {0}")]
    Backend(String),
}

impl DocumentStoreError {
    /// Shorthand for building a [`DocumentStoreError::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        DocumentStoreError::Validation(message.into())
    }

    /// Returns `true` when the error is a [`DocumentStoreError::DuplicateKey`].
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, DocumentStoreError::DuplicateKey { .. })
    }
}

/// A specialized `Result` type for document store operations.
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

impl From<BsonError> for DocumentStoreError {
    fn from(err: BsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}
