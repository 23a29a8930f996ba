//! Convenient re-exports of commonly used types from docshim.
//!
//! Import this prelude module to quickly access the most frequently used types
//! and traits without needing to import from multiple sub-modules:
//!
//! ```ignore
//! use docshim::prelude::*;
//! ```
//!
//! This provides access to:
//! - The client, collection handles and cursors
//! - Record traits for typed collections
//! - Backend builders
//! - Filters, updates, projections and pipelines
//! - Configuration and error types

pub use docshim_core::{
    client::{DatabaseClient, DynDatabaseClient},
    collection::{CollectionHandle, TypedCollection},
    cursor::Cursor,
    document::{ID_FIELD, Record, RecordExt},
    backend::{StoreBackend, StoreBackendBuilder},
    query::{Query, QueryVisitor, Expr, Sort, SortDirection, FieldOp, QueryBuilder, Filter},
    update::Update,
    projection::Projection,
    expression::Expression,
    pipeline::{Accumulator, Pipeline, PipelineStage},
    results::{DeleteResult, InsertManyOutcome, InsertMode, UpdateResult},
    config::ClientConfig,
    error::{DocumentStoreError, DocumentStoreResult},
};
