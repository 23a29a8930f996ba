//! Query expression evaluation for in-memory document filtering.
//!
//! This module provides the evaluation engine for filter expressions and the value
//! comparisons shared by sorting, grouping and update operators.

use bson::{Bson, DateTime, Document, oid::ObjectId};
use std::cmp::Ordering;

use docshim_core::{
    document::resolve_path,
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, FieldOp, QueryVisitor},
};

/// Comparable representation of BSON values.
///
/// Integers of both widths are kept exact as `i64`, so distinct identities above 2^53
/// stay distinct. Integers and doubles compare by value, so `1`, `1_i64` and `1.0` are
/// equal. Documents keep their field order, which takes part in equality.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Int(i64),
    Double(f64),
    String(&'a str),
    Map(Vec<(&'a str, Comparable<'a>)>),
    Array(Vec<Comparable<'a>>),
    ObjectId(ObjectId),
    Bool(bool),
    DateTime(DateTime),
    /// Any other BSON type; compared with BSON equality only.
    Other(&'a Bson),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null | Bson::Undefined => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Int(i64::from(*value)),
            Bson::Int64(value) => Comparable::Int(*value),
            Bson::Double(value) => Comparable::Double(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::Array(arr) => Comparable::Array(arr.iter().map(Comparable::from).collect()),
            Bson::Document(doc) => Comparable::Map(
                doc.iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect(),
            ),
            other => Comparable::Other(other),
        }
    }
}

impl<'a> Comparable<'a> {
    /// Position of the value's type in the cross-type sort order.
    fn type_rank(&self) -> u8 {
        match self {
            Comparable::Null => 0,
            Comparable::Int(_) | Comparable::Double(_) => 1,
            Comparable::String(_) => 2,
            Comparable::Map(_) => 3,
            Comparable::Array(_) => 4,
            Comparable::ObjectId(_) => 5,
            Comparable::Bool(_) => 6,
            Comparable::DateTime(_) => 7,
            Comparable::Other(_) => 8,
        }
    }

    /// Orders two numbers by value. NaN sorts below every other number and the two
    /// zeros are equal. Non-numbers compare as equal.
    fn number_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Comparable::Int(a), Comparable::Int(b)) => a.cmp(b),
            (Comparable::Double(a), Comparable::Double(b)) => double_cmp(*a, *b),
            (Comparable::Int(a), Comparable::Double(b)) => int_double_cmp(*a, *b),
            (Comparable::Double(a), Comparable::Int(b)) => int_double_cmp(*b, *a).reverse(),
            _ => Ordering::Equal,
        }
    }

    /// Total order over all values: first by type rank, then by value.
    pub(crate) fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => Ordering::Equal,
            (Comparable::Int(_) | Comparable::Double(_), Comparable::Int(_) | Comparable::Double(_)) => {
                self.number_cmp(other)
            }
            (Comparable::String(a), Comparable::String(b)) => a.cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.cmp(b),
            (Comparable::Bool(a), Comparable::Bool(b)) => a.cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.cmp(b),
            (Comparable::Array(a), Comparable::Array(b)) => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| x.total_cmp(y))
                .find(|ordering| ordering.is_ne())
                .unwrap_or_else(|| a.len().cmp(&b.len())),
            (Comparable::Map(a), Comparable::Map(b)) => a
                .iter()
                .zip(b.iter())
                .map(|((ka, va), (kb, vb))| ka.cmp(kb).then_with(|| va.total_cmp(vb)))
                .find(|ordering| ordering.is_ne())
                .unwrap_or_else(|| a.len().cmp(&b.len())),
            (Comparable::Other(_), Comparable::Other(_)) => Ordering::Equal,
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Int(_) | Comparable::Double(_), Comparable::Int(_) | Comparable::Double(_)) => {
                self.number_cmp(other).is_eq()
            }
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            (Comparable::Other(a), Comparable::Other(b)) => a == b,
            _ => false,
        }
    }
}

/// Ordering within a single type bracket; values of different types are unordered.
impl<'a> PartialOrd for Comparable<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Int(_) | Comparable::Double(_), Comparable::Int(_) | Comparable::Double(_)) => {
                Some(self.number_cmp(other))
            }
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.partial_cmp(b),
            (Comparable::Array(_), Comparable::Array(_)) | (Comparable::Map(_), Comparable::Map(_)) => {
                Some(self.total_cmp(other))
            }
            _ => None,
        }
    }
}

/// 2^63, the first double above every `i64`.
const I64_LIMIT: f64 = 9_223_372_036_854_775_808.0;

fn double_cmp(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

/// Compares an integer with a double without rounding the integer.
fn int_double_cmp(int: i64, double: f64) -> Ordering {
    if double.is_nan() || double < -I64_LIMIT {
        return Ordering::Greater;
    }
    if double >= I64_LIMIT {
        return Ordering::Less;
    }

    let whole = double.trunc();

    int.cmp(&(whole as i64))
        .then_with(|| double_cmp(0.0, double - whole))
}

/// BSON equality with numbers compared by value across widths.
pub(crate) fn values_equal(left: &Bson, right: &Bson) -> bool {
    Comparable::from(left) == Comparable::from(right)
}

/// Total order over optional values, with a missing value sorting as null.
pub(crate) fn compare_values(left: Option<&Bson>, right: Option<&Bson>) -> Ordering {
    let left = left.map(Comparable::from).unwrap_or(Comparable::Null);
    let right = right.map(Comparable::from).unwrap_or(Comparable::Null);

    left.total_cmp(&right)
}

pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    pub fn evaluate(&mut self, expr: &Expr) -> DocumentStoreResult<bool> {
        self.visit_expr(expr)
    }

    /// Returns `true` when `document` satisfies `expr`.
    pub fn matches(document: &Document, expr: &Expr) -> DocumentStoreResult<bool> {
        DocumentEvaluator::new(document).evaluate(expr)
    }

    /// Keeps the documents satisfying `expr`, stopping at the first evaluation error.
    pub fn filter_documents<'d>(
        documents: impl IntoIterator<Item = &'d Document>,
        expr: &Expr,
    ) -> DocumentStoreResult<Vec<Document>> {
        let mut matched = Vec::new();

        for document in documents {
            if DocumentEvaluator::matches(document, expr)? {
                matched.push(document.clone());
            }
        }

        Ok(matched)
    }

    /// Equality as used by `Eq`: the field equals the value or, when the field is an
    /// array, any of its elements does. A missing field equals null.
    pub fn field_equals(&self, field: &str, value: &Bson) -> bool {
        let expected = Comparable::from(value);

        match resolve_path(self.document, field) {
            None => expected == Comparable::Null,
            Some(found) => candidates(&found)
                .iter()
                .any(|candidate| *candidate == expected),
        }
    }
}

/// The value itself followed by its elements when it is an array.
fn candidates(value: &Bson) -> Vec<Comparable<'_>> {
    let mut all = vec![Comparable::from(value)];

    if let Bson::Array(items) = value {
        all.extend(items.iter().map(Comparable::from));
    }

    all
}

fn list_operand<'v>(op: &FieldOp, value: &'v Bson) -> DocumentStoreResult<&'v [Bson]> {
    value
        .as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| DocumentStoreError::validation(format!("{op:?} requires an array value")))
}

impl<'a> QueryVisitor for DocumentEvaluator<'a> {
    type Output = bool;
    type Error = DocumentStoreError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if !self.visit_expr(expr)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if self.visit_expr(expr)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(!self.visit_expr(expr)?)
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(resolve_path(self.document, field).is_some() == should_exist)
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        match op {
            FieldOp::Eq => return Ok(self.field_equals(field, value)),
            FieldOp::Ne => return Ok(!self.field_equals(field, value)),
            FieldOp::NotContains => return Ok(!self.visit_field(field, &FieldOp::Contains, value)?),
            FieldOp::AnyOf => {
                return Ok(list_operand(op, value)?
                    .iter()
                    .any(|item| self.field_equals(field, item)));
            }
            FieldOp::NoneOf => return Ok(!self.visit_field(field, &FieldOp::AnyOf, value)?),
            FieldOp::All => {
                let items = list_operand(op, value)?;
                return Ok(!items.is_empty() && items.iter().all(|item| self.field_equals(field, item)));
            }
            _ => {}
        }

        let found = match resolve_path(self.document, field) {
            Some(found) => found,
            None => return Ok(false),
        };
        let expected = Comparable::from(value);

        Ok(match op {
            FieldOp::Gt | FieldOp::Gte | FieldOp::Lt | FieldOp::Lte => {
                candidates(&found)
                    .iter()
                    .any(|candidate| match candidate.partial_cmp(&expected) {
                        Some(ordering) => match op {
                            FieldOp::Gt => ordering.is_gt(),
                            FieldOp::Gte => ordering.is_ge(),
                            FieldOp::Lt => ordering.is_lt(),
                            _ => ordering.is_le(),
                        },
                        None => false,
                    })
            }
            FieldOp::Contains => match (Comparable::from(&found), &expected) {
                (Comparable::Array(array), _) => array.iter().any(|item| *item == expected),
                (Comparable::String(left), Comparable::String(right)) => left.contains(right),
                _ => false,
            },
            FieldOp::StartsWith | FieldOp::EndsWith => {
                let needle = match &expected {
                    Comparable::String(needle) => *needle,
                    _ => return Ok(false),
                };

                candidates(&found).iter().any(|candidate| match candidate {
                    Comparable::String(text) if *op == FieldOp::StartsWith => text.starts_with(needle),
                    Comparable::String(text) => text.ends_with(needle),
                    _ => false,
                })
            }
            _ => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use docshim_core::query::Filter;

    fn matches(document: &Document, expr: Expr) -> bool {
        DocumentEvaluator::matches(document, &expr).unwrap()
    }

    #[test]
    fn equality_matches_array_elements() {
        let user = doc! { "name": "Charlie", "interests": ["traveling", "cooking", "gaming"] };

        assert!(matches(&user, Filter::eq("interests", "gaming")));
        assert!(matches(&user, Filter::eq("interests", vec!["traveling", "cooking", "gaming"])));
        assert!(!matches(&user, Filter::eq("interests", "sports")));
    }

    #[test]
    fn negations_match_missing_fields() {
        let user = doc! { "name": "Diana" };

        assert!(matches(&user, Filter::eq("city", Bson::Null)));
        assert!(matches(&user, Filter::ne("city", "Paris")));
        assert!(matches(&user, Filter::none_of("city", vec!["Paris"])));
        assert!(!matches(&user, Filter::gt("age", 0)));
    }

    #[test]
    fn ordering_stays_within_type_bracket() {
        let user = doc! { "age": 30, "score": 2.5, "city": "Paris" };

        assert!(matches(&user, Filter::gt("age", 29.5)));
        assert!(matches(&user, Filter::lte("score", 2_i64.pow(2))));
        assert!(!matches(&user, Filter::gt("city", 5)));
        assert!(!matches(&user, Filter::lt("age", "100")));
    }

    #[test]
    fn all_requires_every_value() {
        let user = doc! { "interests": ["reading", "hiking", "gaming"] };

        assert!(matches(&user, Filter::all_of("interests", vec!["reading", "hiking"])));
        assert!(!matches(&user, Filter::all_of("interests", vec!["reading", "sports"])));
        assert!(!matches(&user, Filter::all_of("interests", Vec::<String>::new())));
    }

    #[test]
    fn not_equal_to_empty_array() {
        assert!(matches(&doc! { "orders": [{ "qty": 2 }] }, Filter::ne("orders", Vec::<Bson>::new())));
        assert!(!matches(&doc! { "orders": [] }, Filter::ne("orders", Vec::<Bson>::new())));
    }

    #[test]
    fn dotted_paths_reach_into_arrays() {
        let user = doc! { "orders": [{ "item": "Laptop", "qty": 1 }, { "item": "Mouse", "qty": 2 }] };

        assert!(matches(&user, Filter::gt("orders.qty", 1)));
        assert!(matches(&user, Filter::eq("orders.item", "Mouse")));
        assert!(matches(&user, Filter::starts_with("orders.item", "Lap")));
    }

    #[test]
    fn total_order_ranks_types() {
        let null = Bson::Null;
        let number = Bson::Int32(7);
        let text = Bson::from("a");

        assert_eq!(compare_values(None, Some(&number)), Ordering::Less);
        assert_eq!(compare_values(Some(&null), None), Ordering::Equal);
        assert_eq!(compare_values(Some(&text), Some(&number)), Ordering::Greater);
        assert_eq!(compare_values(Some(&Bson::Double(7.0)), Some(&number)), Ordering::Equal);
    }

    #[test]
    fn large_integers_stay_distinct() {
        let low = Bson::Int64(9_007_199_254_740_992);
        let high = Bson::Int64(9_007_199_254_740_993);

        assert!(!values_equal(&low, &high));
        assert_eq!(compare_values(Some(&low), Some(&high)), Ordering::Less);
        assert!(values_equal(&low, &Bson::Double(9_007_199_254_740_992.0)));
        assert_eq!(
            compare_values(Some(&Bson::Int64(i64::MAX)), Some(&Bson::Double(9_223_372_036_854_775_808.0))),
            Ordering::Less
        );
        assert_eq!(compare_values(Some(&Bson::Int32(2)), Some(&Bson::Double(2.5))), Ordering::Less);
        assert_eq!(compare_values(Some(&Bson::Int32(-2)), Some(&Bson::Double(-2.5))), Ordering::Greater);
        assert!(matches(&doc! { "_id": 9_007_199_254_740_993_i64 }, Filter::gt("_id", 9_007_199_254_740_992_i64)));
    }

    #[test]
    fn zeros_are_equal_and_nan_sorts_first() {
        let nan = Bson::Double(f64::NAN);

        assert!(values_equal(&Bson::Double(-0.0), &Bson::Double(0.0)));
        assert!(values_equal(&Bson::Double(-0.0), &Bson::Int32(0)));
        assert_eq!(compare_values(Some(&nan), Some(&Bson::Double(f64::NEG_INFINITY))), Ordering::Less);
        assert_eq!(compare_values(Some(&nan), Some(&Bson::Int64(i64::MIN))), Ordering::Less);
        assert_eq!(compare_values(Some(&Bson::Null), Some(&nan)), Ordering::Less);
    }
}
