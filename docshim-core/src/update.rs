//! Field-level update operators.
//!
//! An [`Update`] is an ordered list of operations, each targeting one dotted field path.
//! It is validated before it is handed to a backend, so a malformed update never
//! reaches storage.
//!
//! ```ignore
//! use docshim::update::Update;
//!
//! let update = Update::new()
//!     .set("city", "San Francisco")
//!     .inc("age", 1);
//! ```

use bson::{Bson, Document};

use crate::{
    document::ID_FIELD,
    error::{DocumentStoreError, DocumentStoreResult},
};

/// A single update operator.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOp {
    /// Replaces the field, creating it (and intermediate documents) when absent.
    Set(Bson),
    /// Adds a numeric delta; an absent field counts as zero.
    Inc(Bson),
    /// Appends the value to an array field unless an equal element is present.
    AddToSet(Bson),
    /// Removes every element equal to the value from an array field.
    Pull(Bson),
    /// Removes the field.
    Unset,
}

impl UpdateOp {
    /// The MongoDB operator name for this operation.
    pub fn operator(&self) -> &'static str {
        match self {
            UpdateOp::Set(_) => "$set",
            UpdateOp::Inc(_) => "$inc",
            UpdateOp::AddToSet(_) => "$addToSet",
            UpdateOp::Pull(_) => "$pull",
            UpdateOp::Unset => "$unset",
        }
    }
}

/// An ordered set of field updates applied to every matched document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    operations: Vec<(String, UpdateOp)>,
}

impl Update {
    /// Creates an empty update. An empty update is rejected by [`Update::validate`].
    pub fn new() -> Self {
        Update::default()
    }

    /// Sets `field` to `value`.
    pub fn set(self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.push(field, UpdateOp::Set(value.into()))
    }

    /// Increments `field` by `delta`.
    pub fn inc(self, field: impl Into<String>, delta: impl Into<Bson>) -> Self {
        self.push(field, UpdateOp::Inc(delta.into()))
    }

    /// Adds `value` to the array `field` if it is not already present.
    pub fn add_to_set(self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.push(field, UpdateOp::AddToSet(value.into()))
    }

    /// Removes all occurrences of `value` from the array `field`.
    pub fn pull(self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.push(field, UpdateOp::Pull(value.into()))
    }

    /// Removes `field` from the document.
    pub fn unset(self, field: impl Into<String>) -> Self {
        self.push(field, UpdateOp::Unset)
    }

    fn push(mut self, field: impl Into<String>, op: UpdateOp) -> Self {
        self.operations.push((field.into(), op));
        self
    }

    /// Returns the operations in the order they were added.
    pub fn operations(&self) -> &[(String, UpdateOp)] {
        &self.operations
    }

    /// Checks that the update can be applied.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the update is empty, when a field path is
    /// empty or malformed, when two operations touch the same path (or one path is a
    /// prefix of another), when `_id` is targeted, or when an increment is not numeric.
    pub fn validate(&self) -> DocumentStoreResult<()> {
        if self.operations.is_empty() {
            return Err(DocumentStoreError::validation("update must contain at least one operation"));
        }

        for (index, (field, op)) in self.operations.iter().enumerate() {
            if field.is_empty() || field.starts_with('$') || field.split('.').any(str::is_empty) {
                return Err(DocumentStoreError::validation(format!("invalid update path '{field}'")));
            }

            if field == ID_FIELD || field.starts_with("_id.") {
                return Err(DocumentStoreError::validation("the _id field cannot be modified"));
            }

            if let UpdateOp::Inc(delta) = op {
                if !matches!(delta, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_)) {
                    return Err(DocumentStoreError::validation(format!(
                        "cannot increment '{field}' by a non-numeric value"
                    )));
                }
            }

            let conflict = self.operations[..index]
                .iter()
                .any(|(other, _)| paths_overlap(field, other));

            if conflict {
                return Err(DocumentStoreError::validation(format!(
                    "update path '{field}' conflicts with another operation"
                )));
            }
        }

        Ok(())
    }
}

fn paths_overlap(a: &str, b: &str) -> bool {
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };

    long == short || long.strip_prefix(short).is_some_and(|rest| rest.starts_with('.'))
}

/// Parses an update written in MongoDB operator syntax, such as
/// `{ "$set": { "city": "Paris" }, "$inc": { "age": 1 } }`.
impl TryFrom<&Document> for Update {
    type Error = DocumentStoreError;

    fn try_from(document: &Document) -> Result<Self, Self::Error> {
        let mut update = Update::new();

        for (operator, fields) in document {
            let fields = match fields {
                Bson::Document(fields) => fields,
                _ => {
                    return Err(DocumentStoreError::validation(format!(
                        "{operator} requires a document of fields"
                    )));
                }
            };

            for (field, value) in fields {
                update = match operator.as_str() {
                    "$set" => update.set(field.as_str(), value.clone()),
                    "$inc" => update.inc(field.as_str(), value.clone()),
                    "$addToSet" => update.add_to_set(field.as_str(), value.clone()),
                    "$pull" => update.pull(field.as_str(), value.clone()),
                    "$unset" => update.unset(field.as_str()),
                    other => {
                        return Err(DocumentStoreError::validation(format!("unknown update operator {other}")));
                    }
                };
            }
        }

        update.validate()?;
        Ok(update)
    }
}
