//! Outcome types returned by write operations.

use bson::Bson;

use crate::error::DocumentStoreError;

/// How a batch insert treats failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InsertMode {
    /// The batch is checked up front and either every document is stored or none is.
    #[default]
    AllOrNothing,
    /// Each document is inserted on its own; failures are reported per index.
    BestEffort,
}

/// Whether a write touches the first match or every match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteScope {
    One,
    Many,
}

/// Result of a batch insert.
#[derive(Debug, Default)]
pub struct InsertManyOutcome {
    /// Identities of the stored documents, in input order.
    pub inserted_ids: Vec<Bson>,
    /// Input index and error of every document that was not stored.
    pub failures: Vec<(usize, DocumentStoreError)>,
}

impl InsertManyOutcome {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateResult {
    /// Number of documents the filter selected.
    pub matched_count: u64,
    /// Number of documents whose content actually changed.
    pub modified_count: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteResult {
    pub deleted_count: u64,
}
