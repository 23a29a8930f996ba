//! Query translation from docshim filter expressions to MongoDB query syntax.
//!
//! This module translates docshim's abstract query expressions into
//! MongoDB BSON documents for execution by the MongoDB query engine.

use bson::{Bson, Document, doc};

use docshim_core::{
    error::DocumentStoreError,
    query::{Expr, FieldOp, QueryVisitor},
};

/// Translates docshim query expressions into MongoDB query documents.
///
/// This struct implements the [`QueryVisitor`] trait to convert abstract
/// query expressions into MongoDB's native BSON query syntax. String operators
/// are case-sensitive, like the in-memory evaluator.
pub(crate) struct MongoQueryTranslator;

impl MongoQueryTranslator {
    /// Translates a filter, mapping the match-all filter to `{}`.
    pub fn translate(expr: &Expr) -> Result<Document, DocumentStoreError> {
        MongoQueryTranslator.visit_expr(expr)
    }

    fn visit_all(&mut self, exprs: &[Expr]) -> Result<Vec<Document>, DocumentStoreError> {
        exprs
            .iter()
            .map(|expr| self.visit_expr(expr))
            .collect()
    }
}

impl QueryVisitor for MongoQueryTranslator {
    type Output = Document;
    type Error = DocumentStoreError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        Ok(match exprs {
            [] => doc! {},
            [single] => self.visit_expr(single)?,
            _ => doc! { "$and": self.visit_all(exprs)? },
        })
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            "$or": self.visit_all(exprs)?,
        })
    }

    // `$not` is only valid on a field, so top-level negation goes through `$nor`.
    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            "$nor": [self.visit_expr(expr)?],
        })
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            field: { "$exists": should_exist },
        })
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        Ok(match op {
            FieldOp::Eq => doc! { field: { "$eq": value } },
            FieldOp::Ne => doc! { field: { "$ne": value } },
            FieldOp::Gt => doc! { field: { "$gt": value } },
            FieldOp::Gte => doc! { field: { "$gte": value } },
            FieldOp::Lt => doc! { field: { "$lt": value } },
            FieldOp::Lte => doc! { field: { "$lte": value } },
            FieldOp::Contains => match value {
                Bson::String(s) => doc! {
                    "$or": [
                        { field: { "$elemMatch": { "$eq": s } } },
                        { field: { "$regex": escape_regex(s) } },
                    ],
                },
                _ => doc! { field: { "$elemMatch": { "$eq": value } } },
            },
            FieldOp::NotContains => doc! {
                "$nor": [self.visit_field(field, &FieldOp::Contains, value)?],
            },
            FieldOp::StartsWith => match value {
                Bson::String(s) => doc! { field: { "$regex": format!("^{}", escape_regex(s)) } },
                _ => return Err(DocumentStoreError::validation("StartsWith operator requires a string value")),
            },
            FieldOp::EndsWith => match value {
                Bson::String(s) => doc! { field: { "$regex": format!("{}$", escape_regex(s)) } },
                _ => return Err(DocumentStoreError::validation("EndsWith operator requires a string value")),
            },
            FieldOp::AnyOf => doc! { field: { "$in": value } },
            FieldOp::NoneOf => doc! { field: { "$nin": value } },
            FieldOp::All => doc! { field: { "$all": value } },
        })
    }
}

/// Escapes regex metacharacters so `text` matches literally.
fn escape_regex(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());

    for c in text.chars() {
        if "\\.+*?()|[]{}^$".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }

    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use docshim_core::query::Filter;

    #[test]
    fn match_all_translates_to_empty_filter() {
        assert_eq!(MongoQueryTranslator::translate(&Filter::all()).unwrap(), doc! {});
    }

    #[test]
    fn conjunctions_keep_every_clause() {
        let filter = Filter::and([Filter::eq("city", "New York"), Filter::lt("age", 30)]);

        assert_eq!(
            MongoQueryTranslator::translate(&filter).unwrap(),
            doc! { "$and": [{ "city": { "$eq": "New York" } }, { "age": { "$lt": 30 } }] },
        );
    }

    #[test]
    fn negation_uses_nor() {
        let filter = Filter::eq("city", "Paris").not();

        assert_eq!(
            MongoQueryTranslator::translate(&filter).unwrap(),
            doc! { "$nor": [{ "city": { "$eq": "Paris" } }] },
        );
    }

    #[test]
    fn string_patterns_are_escaped() {
        let filter = Filter::starts_with("email", "a.b+");

        assert_eq!(
            MongoQueryTranslator::translate(&filter).unwrap(),
            doc! { "email": { "$regex": "^a\\.b\\+" } },
        );
    }

    #[test]
    fn list_operators_pass_arrays_through() {
        let filter = Filter::any_of("city", vec!["Paris", "London"]);

        assert_eq!(
            MongoQueryTranslator::translate(&filter).unwrap(),
            doc! { "city": { "$in": ["Paris", "London"] } },
        );
    }
}
