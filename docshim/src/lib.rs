//! Main docshim crate providing a unified interface for document database access.
//!
//! This crate is the primary entry point for users of docshim. It re-exports the core
//! types and functionality from the sub-crates and provides access to the storage
//! backends. Application code talks to a [`DatabaseClient`](client::DatabaseClient) and
//! its collection handles; which database sits behind it is decided when the client is
//! connected, so the same code runs against MongoDB in production and the in-memory
//! store in tests.
//!
//! # Features
//!
//! - **Connection lifecycle** - `connect` verifies the backend, `disconnect` is idempotent
//! - **CRUD contract** - Inserts with explicit batch policies, filtered finds, updates, deletes and counts
//! - **Aggregation** - Group, sort, unwind, project, match, lookup, limit and skip stages
//! - **Multiple backends** - In-memory and MongoDB storage behind one trait
//!
//! # Quick Start
//!
//! ```ignore
//! use docshim::{prelude::*, memory::InMemoryStore};
//! use bson::doc;
//!
//! #[tokio::main]
//! async fn main() -> DocumentStoreResult<()> {
//!     let client = DatabaseClient::connect(InMemoryStore::builder().build().await?).await?;
//!     let users = client.collection("users_data");
//!
//!     users.insert_one(doc! { "name": "Alice", "age": 30, "city": "New York" }).await?;
//!
//!     let stats = users
//!         .aggregate(Pipeline::new().stage(PipelineStage::group(
//!             Expression::field("city"),
//!             [("userCount", Accumulator::Count)],
//!         )?))
//!         .await?
//!         .try_collect_all()
//!         .await?;
//!
//!     println!("{stats:?}");
//!     client.disconnect().await
//! }
//! ```
//!
//! # Dynamic Dispatch
//!
//! When the backend is only known at runtime, box it as a
//! [`DynStoreBackend`](backend::DynStoreBackend) and connect a
//! [`DynDatabaseClient`](client::DynDatabaseClient):
//!
//! ```ignore
//! use docshim::{prelude::*, backend::DynStoreBackend, memory::InMemoryStore};
//!
//! let backend: Box<dyn DynStoreBackend> = Box::new(InMemoryStore::new());
//! let client: DynDatabaseClient = DatabaseClient::connect(backend).await?;
//! ```
//!
//! # Backends
//!
//! - [`memory`] - In-memory storage for development and testing
//! - [`mongodb`] - MongoDB backend (requires the `mongodb` feature, on by default)

pub mod prelude;

pub use docshim_core::{
    backend, client, collection, config, cursor, document, error, expression, pipeline, projection, query, results,
    update,
};

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use docshim_memory::{InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docshim_mongodb::{MongoDbStore, MongoDbStoreBuilder};
}
