//! A thin, injectable document database client layer.
//!
//! This crate is the core of the docshim project and provides:
//!
//! - **Documents and records** ([`document`]) - Identity handling, structural validation, dotted paths
//! - **Store backend abstraction** ([`backend`]) - Traits for implementing document database backends
//! - **Query and filtering API** ([`query`]) - Type-safe filters, sorting and pagination
//! - **Updates** ([`update`]) - Field-level update operators
//! - **Aggregation** ([`pipeline`], [`expression`], [`projection`]) - Pipeline stages and value expressions
//! - **Client** ([`client`]) - Connection lifecycle and collection access
//! - **Collections** ([`collection`]) - The CRUD and aggregate contract
//! - **Configuration** ([`config`]) - Connection settings from serde sources or the environment
//! - **Error handling** ([`error`]) - Error taxonomy and result type
//!
//! # Example
//!
//! ```ignore
//! use docshim::prelude::*;
//! use bson::doc;
//!
//! let client = DatabaseClient::connect(backend).await?;
//! let users = client.collection("users_data");
//!
//! users.insert_one(doc! { "name": "Alice", "age": 30 }).await?;
//! let adults = users
//!     .find(Filter::gt("age", 18))
//!     .await?
//!     .try_collect_all()
//!     .await?;
//!
//! client.disconnect().await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as docshim_core;

pub mod backend;
pub mod client;
pub mod collection;
pub mod config;
pub mod cursor;
pub mod document;
pub mod error;
pub mod expression;
pub mod pipeline;
pub mod projection;
pub mod query;
pub mod results;
pub mod update;
