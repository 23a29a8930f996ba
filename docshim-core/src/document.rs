//! Core traits and helpers for document representation and serialization.
//!
//! Documents are plain [`bson::Document`] values: ordered maps from field name to a
//! dynamically typed [`Bson`] value. The reserved identity field is [`ID_FIELD`].
//!
//! This module also provides the [`Record`] trait for mapping Rust types onto documents,
//! and the dotted-path helpers shared by every backend that evaluates documents locally.

use bson::{
    Bson, Document,
    de::deserialize_from_document,
    oid::ObjectId,
    ser::serialize_to_document,
};
use serde::{Deserialize, Serialize};

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// Name of the reserved identity field.
pub const ID_FIELD: &str = "_id";

/// A Rust type that is stored as a document in a named collection.
///
/// The identity is carried in the serialized form under `_id`. Types that let the
/// store generate identities should mark their id field with
/// `#[serde(rename = "_id", skip_serializing_if = "Option::is_none")]`.
///
/// # Example
///
/// ```ignore
/// use docshim::document::Record;
/// use bson::oid::ObjectId;
/// use serde::{Serialize, Deserialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// pub struct User {
///     #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
///     pub id: Option<ObjectId>,
///     pub name: String,
/// }
///
/// impl Record for User {
///     fn collection_name() -> &'static str {
///         "users"
///     }
/// }
/// ```
pub trait Record: Serialize + for<'de> Deserialize<'de> + Send + Sync + Clone + 'static {
    /// Returns the name of the collection this record belongs to.
    fn collection_name() -> &'static str;
}

/// Extension trait converting records to and from documents.
///
/// This trait is automatically implemented for all types that implement [`Record`].
pub trait RecordExt: Record {
    /// Converts this record to a document.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or the record does not serialize to a map.
    fn to_document(&self) -> DocumentStoreResult<Document>;

    /// Creates a record from a document.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails or the structure is invalid.
    fn from_document(document: Document) -> DocumentStoreResult<Self>;
}

impl<R: Record> RecordExt for R {
    fn to_document(&self) -> DocumentStoreResult<Document> {
        Ok(serialize_to_document(self)?)
    }

    fn from_document(document: Document) -> DocumentStoreResult<Self> {
        Ok(deserialize_from_document(document)?)
    }
}

/// Returns the document's identity, assigning a fresh [`ObjectId`] first when it has none.
///
/// A generated identity is placed as the first field, matching what MongoDB drivers do.
pub fn ensure_id(document: &mut Document) -> Bson {
    if let Some(id) = document.get(ID_FIELD) {
        return id.clone();
    }

    let id = Bson::ObjectId(ObjectId::new());
    let mut with_id = Document::new();
    with_id.insert(ID_FIELD, id.clone());

    for (key, value) in std::mem::take(document) {
        with_id.insert(key, value);
    }

    *document = with_id;
    id
}

/// Checks the structural rules every stored document must satisfy.
///
/// Field names must be non-empty, must not start with `$` and must not contain `.`,
/// at any nesting depth. An `_id` holding an array is rejected.
pub fn validate_document(document: &Document) -> DocumentStoreResult<()> {
    if let Some(Bson::Array(_)) = document.get(ID_FIELD) {
        return Err(DocumentStoreError::validation("_id cannot be an array"));
    }

    validate_keys(document)
}

fn validate_keys(document: &Document) -> DocumentStoreResult<()> {
    for (key, value) in document {
        if key.is_empty() {
            return Err(DocumentStoreError::validation("field names cannot be empty"));
        }
        if key.starts_with('$') || key.contains('.') {
            return Err(DocumentStoreError::validation(format!(
                "field name '{key}' may not start with '$' or contain '.'"
            )));
        }

        validate_value(value)?;
    }

    Ok(())
}

fn validate_value(value: &Bson) -> DocumentStoreResult<()> {
    match value {
        Bson::Document(inner) => validate_keys(inner),
        Bson::Array(items) => items.iter().try_for_each(validate_value),
        _ => Ok(()),
    }
}

/// Resolves a dotted field path against a document.
///
/// Traversal descends through embedded documents. When an array is met before the
/// path is exhausted, the remaining path is resolved against every element and the
/// found values are collected into an array, so `orders.qty` over an array of orders
/// yields the array of quantities.
pub fn resolve_path(document: &Document, path: &str) -> Option<Bson> {
    let mut parts = path.splitn(2, '.');
    let head = parts.next()?;
    let value = document.get(head)?;

    match parts.next() {
        None => Some(value.clone()),
        Some(rest) => resolve_value_path(value, rest),
    }
}

/// Resolves a dotted path inside an arbitrary value, with the same array traversal
/// rules as [`resolve_path`]. Scalars have no fields, so they resolve to `None`.
pub fn resolve_value_path(value: &Bson, path: &str) -> Option<Bson> {
    match value {
        Bson::Document(inner) => resolve_path(inner, path),
        Bson::Array(items) => {
            let found = items
                .iter()
                .filter_map(|item| match item {
                    Bson::Document(inner) => resolve_path(inner, path),
                    _ => None,
                })
                .collect::<Vec<_>>();

            if found.is_empty() { None } else { Some(Bson::Array(found)) }
        }
        _ => None,
    }
}

/// Sets a dotted field path, creating intermediate documents as needed.
///
/// # Errors
///
/// Returns a validation error when an intermediate segment holds a non-document value.
pub fn set_path(document: &mut Document, path: &str, value: Bson) -> DocumentStoreResult<()> {
    match path.split_once('.') {
        None => {
            document.insert(path, value);
            Ok(())
        }
        Some((head, rest)) => {
            if !document.contains_key(head) {
                document.insert(head, Document::new());
            }

            match document.get_mut(head) {
                Some(Bson::Document(inner)) => set_path(inner, rest, value),
                _ => Err(DocumentStoreError::validation(format!(
                    "cannot create field '{rest}' inside non-document field '{head}'"
                ))),
            }
        }
    }
}

/// Returns a reference to the value at a dotted path, descending through embedded
/// documents only.
pub fn lookup_path<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    match path.split_once('.') {
        None => document.get(path),
        Some((head, rest)) => match document.get(head) {
            Some(Bson::Document(inner)) => lookup_path(inner, rest),
            _ => None,
        },
    }
}

/// Removes a dotted field path, returning the removed value.
pub fn remove_path(document: &mut Document, path: &str) -> Option<Bson> {
    match path.split_once('.') {
        None => document.remove(path),
        Some((head, rest)) => match document.get_mut(head) {
            Some(Bson::Document(inner)) => remove_path(inner, rest),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn ensure_id_prepends_generated_identity() {
        let mut document = doc! { "name": "Alice" };
        let id = ensure_id(&mut document);

        assert!(matches!(id, Bson::ObjectId(_)));
        assert_eq!(document.keys().next().map(String::as_str), Some(ID_FIELD));
        assert_eq!(document.get("name"), Some(&Bson::from("Alice")));
    }

    #[test]
    fn ensure_id_keeps_existing_identity() {
        let mut document = doc! { "_id": "P001", "productName": "Laptop Pro" };

        assert_eq!(ensure_id(&mut document), Bson::from("P001"));
        assert_eq!(document.len(), 2);
    }

    #[test]
    fn resolve_path_descends_through_arrays() {
        let document = doc! {
            "orders": [
                { "item": "Laptop", "qty": 1 },
                { "item": "Mouse", "qty": 2 },
            ],
        };

        assert_eq!(
            resolve_path(&document, "orders.qty"),
            Some(Bson::Array(vec![Bson::Int32(1), Bson::Int32(2)])),
        );
        assert_eq!(resolve_path(&document, "orders.missing"), None);
    }

    #[test]
    fn set_path_creates_intermediate_documents() {
        let mut document = doc! { "name": "Alice" };
        set_path(&mut document, "address.city", Bson::from("Paris")).unwrap();

        assert_eq!(document, doc! { "name": "Alice", "address": { "city": "Paris" } });
        assert!(set_path(&mut document, "name.first", Bson::from("A")).is_err());
    }

    #[test]
    fn validate_document_rejects_operator_keys() {
        assert!(validate_document(&doc! { "$set": { "a": 1 } }).is_err());
        assert!(validate_document(&doc! { "nested": { "a.b": 1 } }).is_err());
        assert!(validate_document(&doc! { "_id": [1, 2] }).is_err());
        assert!(validate_document(&doc! { "name": "ok", "tags": [{ "x": 1 }] }).is_ok());
    }
}
