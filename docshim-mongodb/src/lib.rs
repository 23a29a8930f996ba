//! MongoDB backend implementation for docshim.
//!
//! This crate provides a MongoDB-based implementation of the `StoreBackend` trait.
//! Filters, updates, projections and aggregation pipelines are translated into
//! MongoDB's native syntax and executed by the server.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`
//! (enabled by default):
//!
//! ```toml
//! [dependencies]
//! docshim = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Connection
//!
//! The backend is configured from a [`ClientConfig`](docshim_core::config::ClientConfig),
//! which carries the connection string, database name and optional timeouts.
//!
//! # Example
//!
//! ```ignore
//! use docshim::{backend::StoreBackendBuilder, client::DatabaseClient, config::ClientConfig, mongodb::MongoDbStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = MongoDbStore::builder(ClientConfig::from_env()?)
//!         .build()
//!         .await?;
//!     let client = DatabaseClient::connect(store).await?;
//!
//!     client.disconnect().await?;
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docshim_mongodb;

mod query;
mod translate;

pub mod store;

pub use store::{MongoDbStore, MongoDbStoreBuilder};
