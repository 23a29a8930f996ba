//! In-memory document storage backend for docshim.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StoreBackend` trait
//! that mirrors MongoDB's matching, update and aggregation semantics closely enough to stand
//! in for a live server in tests and demos.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and exclusive writes through an async-aware RwLock
//! - **Schemaless storage** - Collections hold raw BSON documents in insertion order
//! - **Full query support** - Filtering, sorting, pagination and projection
//! - **Aggregation** - `$match`, `$group`, `$sort`, `$unwind`, `$project`, `$lookup`, `$limit` and `$skip`
//!
//! # Quick Start
//!
//! ```ignore
//! use docshim::prelude::*;
//! use docshim_memory::InMemoryStore;
//! use bson::doc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = DatabaseClient::connect(InMemoryStore::new()).await?;
//!     let users = client.collection("users_data");
//!
//!     users.insert_one(doc! { "name": "Alice", "city": "New York" }).await?;
//!     let in_new_york = users.count_documents(Filter::eq("city", "New York")).await?;
//!
//!     client.disconnect().await?;
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docshim_memory;

mod aggregate;
mod evaluator;
mod expression;
mod numeric;
mod update;

pub mod store;

pub use store::{InMemoryStore, InMemoryStoreBuilder};
