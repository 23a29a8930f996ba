//! Update operator application.

use bson::{Bson, Document};

use docshim_core::{
    document::{lookup_path, remove_path, set_path},
    error::{DocumentStoreError, DocumentStoreResult},
    update::{Update, UpdateOp},
};

use crate::{evaluator::values_equal, numeric::Number};

/// Applies `update` to a copy of `document`.
///
/// The input is never modified, so a failure part way through leaves nothing to undo.
pub(crate) fn apply_update(document: &Document, update: &Update) -> DocumentStoreResult<Document> {
    let mut updated = document.clone();

    for (path, op) in update.operations() {
        apply_operation(&mut updated, path, op)?;
    }

    Ok(updated)
}

fn apply_operation(document: &mut Document, path: &str, op: &UpdateOp) -> DocumentStoreResult<()> {
    match op {
        UpdateOp::Set(value) => set_path(document, path, value.clone()),
        UpdateOp::Unset => {
            remove_path(document, path);
            Ok(())
        }
        UpdateOp::Inc(delta) => {
            let delta = Number::from_bson(delta)
                .ok_or_else(|| DocumentStoreError::validation(format!("cannot increment '{path}' by a non-numeric value")))?;

            let next = match lookup_path(document, path) {
                None => delta,
                Some(current) => Number::from_bson(current)
                    .ok_or_else(|| {
                        DocumentStoreError::validation(format!("cannot increment non-numeric field '{path}'"))
                    })?
                    .add(delta),
            };

            set_path(document, path, next.into())
        }
        UpdateOp::AddToSet(value) => match lookup_path(document, path) {
            None => set_path(document, path, Bson::Array(vec![value.clone()])),
            Some(Bson::Array(items)) => {
                if items.iter().any(|item| values_equal(item, value)) {
                    return Ok(());
                }

                let mut items = items.clone();
                items.push(value.clone());
                set_path(document, path, Bson::Array(items))
            }
            Some(_) => Err(DocumentStoreError::validation(format!(
                "cannot add to set on non-array field '{path}'"
            ))),
        },
        UpdateOp::Pull(value) => match lookup_path(document, path) {
            None => Ok(()),
            Some(Bson::Array(items)) => {
                let kept = items
                    .iter()
                    .filter(|item| !values_equal(item, value))
                    .cloned()
                    .collect::<Vec<_>>();

                set_path(document, path, Bson::Array(kept))
            }
            Some(_) => Err(DocumentStoreError::validation(format!(
                "cannot pull from non-array field '{path}'"
            ))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn increments_create_and_widen() {
        let document = doc! { "age": 30, "visits": i32::MAX };
        let updated = apply_update(
            &document,
            &Update::new().inc("age", 1).inc("visits", 1).inc("score", 0.5),
        )
        .unwrap();

        assert_eq!(updated.get("age"), Some(&Bson::Int32(31)));
        assert_eq!(updated.get("visits"), Some(&Bson::Int64(i64::from(i32::MAX) + 1)));
        assert_eq!(updated.get("score"), Some(&Bson::Double(0.5)));
    }

    #[test]
    fn increment_of_string_fails_without_touching_input() {
        let document = doc! { "name": "Bob", "age": 25 };
        let result = apply_update(&document, &Update::new().inc("age", 1).inc("name", 1));

        assert!(matches!(result, Err(DocumentStoreError::Validation(_))));
        assert_eq!(document, doc! { "name": "Bob", "age": 25 });
    }

    #[test]
    fn add_to_set_is_idempotent() {
        let document = doc! { "interests": ["gaming", "coding"] };
        let update = Update::new().add_to_set("interests", "traveling");

        let once = apply_update(&document, &update).unwrap();
        let twice = apply_update(&once, &update).unwrap();

        assert_eq!(once, twice);
        assert_eq!(once, doc! { "interests": ["gaming", "coding", "traveling"] });
    }

    #[test]
    fn pull_removes_every_occurrence_in_order() {
        let document = doc! { "tags": ["a", "b", "a", "c"] };
        let updated = apply_update(&document, &Update::new().pull("tags", "a")).unwrap();

        assert_eq!(updated, doc! { "tags": ["b", "c"] });
        assert_eq!(apply_update(&doc! {}, &Update::new().pull("tags", "a")).unwrap(), doc! {});
        assert!(apply_update(&doc! { "tags": "a" }, &Update::new().pull("tags", "a")).is_err());
    }

    #[test]
    fn set_and_unset_nested_paths() {
        let document = doc! { "name": "Alice", "address": { "city": "New York", "zip": "10001" } };
        let updated = apply_update(
            &document,
            &Update::new().set("address.city", "San Francisco").unset("address.zip"),
        )
        .unwrap();

        assert_eq!(updated, doc! { "name": "Alice", "address": { "city": "San Francisco" } });
    }
}
