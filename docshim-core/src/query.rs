//! Query construction and filtering API for document stores.
//!
//! This module provides type-safe query construction with filtering, projection, sorting,
//! pagination, and a visitor pattern for query execution across different backends.
//!
//! # Query Building
//!
//! Queries can be constructed using the fluent builder API:
//!
//! ```ignore
//! use docshim::query::{Query, Filter, SortDirection};
//!
//! let query = Query::builder()
//!     .filter(Filter::gt("age", 30))
//!     .sort("name", SortDirection::Asc)
//!     .limit(10)
//!     .build();
//! ```
//!
//! # Filter Expression API
//!
//! The [`Filter`] struct provides a collection of static methods for building filter expressions:
//!
//! - Comparison: `eq`, `ne`, `gt`, `gte`, `lt`, `lte`
//! - String: `starts_with`, `ends_with`, `contains`, `not_contains`
//! - Existence: `exists`, `not_exists`
//! - Array: `any_of`, `none_of`, `all_of`
//! - Logical: `and`, `or`, `all`
//!
//! Filters written in MongoDB query syntax can be parsed with `Expr::try_from(&document)`.

use bson::{Bson, Document};

use crate::{
    error::{DocumentStoreError, DocumentStoreResult},
    projection::Projection,
};

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order (A to Z, 0 to 9, earliest to latest).
    Asc,
    /// Descending order (Z to A, 9 to 0, latest to earliest).
    Desc,
}

impl SortDirection {
    /// The MongoDB numeric form of this direction (`1` or `-1`).
    pub fn as_i32(&self) -> i32 {
        match self {
            SortDirection::Asc => 1,
            SortDirection::Desc => -1,
        }
    }
}

/// One sort key: a field path and a direction.
#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    /// The field path to sort by.
    pub field: String,
    /// The sort direction.
    pub direction: SortDirection,
}

impl Sort {
    /// Ascending sort on `field`.
    pub fn asc(field: impl Into<String>) -> Self {
        Sort { field: field.into(), direction: SortDirection::Asc }
    }

    /// Descending sort on `field`.
    pub fn desc(field: impl Into<String>) -> Self {
        Sort { field: field.into(), direction: SortDirection::Desc }
    }
}

/// Field comparison operators for filter expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOp {
    /// Equal to. On an array field, also matches when any element is equal.
    Eq,
    /// Not equal to (negation of `Eq`, so it matches missing fields).
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal to.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal to.
    Lte,
    /// String contains substring, or array contains element.
    Contains,
    /// Negation of `Contains`.
    NotContains,
    /// String starts with value.
    StartsWith,
    /// String ends with value.
    EndsWith,
    /// Field (or any element of it) equals one of the listed values.
    AnyOf,
    /// Negation of `AnyOf`.
    NoneOf,
    /// Array field contains every one of the listed values.
    All,
}

/// A filter expression for querying documents.
///
/// Expressions can be combined using logical operators (`And`, `Or`, `Not`)
/// to build complex filter predicates. An empty `And` matches every document.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Logical AND of multiple expressions (all must match).
    And(Vec<Expr>),
    /// Logical OR of multiple expressions (any must match).
    Or(Vec<Expr>),
    /// Logical NOT of an expression (inverts the result).
    Not(Box<Expr>),
    /// Checks if a field exists or doesn't exist.
    Exists(String, bool),
    /// Field comparison expression.
    Field {
        /// The field path to compare.
        field: String,
        /// The comparison operator.
        op: FieldOp,
        /// The value to compare against.
        value: Bson,
    },
}

impl Expr {
    /// Creates a field comparison expression.
    pub fn field(field: String, op: FieldOp, value: Bson) -> Self {
        Expr::Field { field, op, value }
    }

    /// Combines this expression with another using logical AND.
    ///
    /// If this expression is already an AND, the other expression is appended
    /// to the list. Otherwise, a new AND expression is created.
    pub fn and(self, other: Expr) -> Self {
        match self {
            Expr::And(mut list) => {
                list.push(other);
                Expr::And(list)
            }
            _ => Expr::And(vec![self, other]),
        }
    }

    /// Combines this expression with another using logical OR.
    ///
    /// If this expression is already an OR, the other expression is appended
    /// to the list. Otherwise, a new OR expression is created.
    pub fn or(self, other: Expr) -> Self {
        match self {
            Expr::Or(mut list) => {
                list.push(other);
                Expr::Or(list)
            }
            _ => Expr::Or(vec![self, other]),
        }
    }

    /// Negates this expression (logical NOT).
    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    /// Returns `true` for the match-everything filter.
    pub fn is_match_all(&self) -> bool {
        matches!(self, Expr::And(list) if list.is_empty())
    }

    /// Checks the shape of the expression.
    ///
    /// Field paths must be non-empty and must not start with `$`; the list
    /// operators (`AnyOf`, `NoneOf`, `All`) require an array value; `Or` requires
    /// at least one branch.
    pub fn validate(&self) -> DocumentStoreResult<()> {
        match self {
            Expr::And(list) => list.iter().try_for_each(Expr::validate),
            Expr::Or(list) => {
                if list.is_empty() {
                    return Err(DocumentStoreError::validation("$or requires at least one expression"));
                }
                list.iter().try_for_each(Expr::validate)
            }
            Expr::Not(inner) => inner.validate(),
            Expr::Exists(field, _) => validate_field_path(field),
            Expr::Field { field, op, value } => {
                validate_field_path(field)?;

                match op {
                    FieldOp::AnyOf | FieldOp::NoneOf | FieldOp::All if !matches!(value, Bson::Array(_)) => {
                        Err(DocumentStoreError::validation(format!("{op:?} on '{field}' requires an array value")))
                    }
                    FieldOp::StartsWith | FieldOp::EndsWith if !matches!(value, Bson::String(_)) => {
                        Err(DocumentStoreError::validation(format!("{op:?} on '{field}' requires a string value")))
                    }
                    _ => Ok(()),
                }
            }
        }
    }
}

impl Default for Expr {
    fn default() -> Self {
        Filter::all()
    }
}

fn validate_field_path(field: &str) -> DocumentStoreResult<()> {
    if field.is_empty() || field.starts_with('$') || field.split('.').any(str::is_empty) {
        return Err(DocumentStoreError::validation(format!("invalid field path '{field}'")));
    }

    Ok(())
}

/// Parses a filter written in MongoDB query syntax.
///
/// Supported: implicit equality, `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`, `$in`,
/// `$nin`, `$all`, `$exists`, `$not`, and the top-level `$and`, `$or`, `$nor`.
/// Any other operator is rejected with a validation error.
impl TryFrom<&Document> for Expr {
    type Error = DocumentStoreError;

    fn try_from(document: &Document) -> Result<Self, Self::Error> {
        let mut clauses = Vec::with_capacity(document.len());

        for (key, value) in document {
            match key.as_str() {
                "$and" | "$or" | "$nor" => {
                    let branches = value
                        .as_array()
                        .ok_or_else(|| DocumentStoreError::validation(format!("{key} requires an array")))?
                        .iter()
                        .map(|branch| match branch {
                            Bson::Document(inner) => Expr::try_from(inner),
                            _ => Err(DocumentStoreError::validation(format!("{key} entries must be documents"))),
                        })
                        .collect::<DocumentStoreResult<Vec<_>>>()?;

                    if branches.is_empty() {
                        return Err(DocumentStoreError::validation(format!("{key} requires a non-empty array")));
                    }

                    clauses.push(match key.as_str() {
                        "$and" => Expr::And(branches),
                        "$or" => Expr::Or(branches),
                        _ => Expr::Or(branches).not(),
                    });
                }
                other if other.starts_with('$') => {
                    return Err(DocumentStoreError::validation(format!("unknown top-level operator {other}")));
                }
                field => clauses.push(parse_field_condition(field, value)?),
            }
        }

        let expr = match clauses.len() {
            1 => clauses.pop().unwrap_or_default(),
            _ => Expr::And(clauses),
        };

        expr.validate()?;
        Ok(expr)
    }
}

fn parse_field_condition(field: &str, value: &Bson) -> DocumentStoreResult<Expr> {
    let operators = match value {
        Bson::Document(inner) if inner.keys().next().is_some_and(|k| k.starts_with('$')) => inner,
        _ => return Ok(Filter::eq(field, value.clone())),
    };

    let mut clauses = Vec::with_capacity(operators.len());

    for (op, operand) in operators {
        let clause = match op.as_str() {
            "$eq" => Filter::eq(field, operand.clone()),
            "$ne" => Filter::ne(field, operand.clone()),
            "$gt" => Filter::gt(field, operand.clone()),
            "$gte" => Filter::gte(field, operand.clone()),
            "$lt" => Filter::lt(field, operand.clone()),
            "$lte" => Filter::lte(field, operand.clone()),
            "$in" => Filter::any_of(field, operand.clone()),
            "$nin" => Filter::none_of(field, operand.clone()),
            "$all" => Filter::all_of(field, operand.clone()),
            "$exists" => match operand {
                Bson::Boolean(should_exist) => Expr::Exists(field.to_string(), *should_exist),
                _ => return Err(DocumentStoreError::validation("$exists requires a boolean")),
            },
            "$not" => match operand {
                Bson::Document(_) => parse_field_condition(field, operand)?.not(),
                _ => return Err(DocumentStoreError::validation("$not requires an operator document")),
            },
            other => {
                return Err(DocumentStoreError::validation(format!("unknown query operator {other}")));
            }
        };

        clauses.push(clause);
    }

    Ok(match clauses.len() {
        1 => clauses.pop().unwrap_or_default(),
        _ => Expr::And(clauses),
    })
}

/// A structured query for retrieving documents.
///
/// This struct encapsulates the filter, projection, sort keys, offset and limit
/// for `find` calls. Use [`QueryBuilder`] for ergonomic construction.
#[derive(Debug, Clone, Default)]
pub struct Query {
    /// Filter expression documents must satisfy.
    pub filter: Expr,
    /// Optional field projection applied to every returned document.
    pub projection: Option<Projection>,
    /// Sort keys, applied in order.
    pub sort: Vec<Sort>,
    /// Number of documents to skip.
    pub offset: Option<usize>,
    /// Maximum number of documents to return.
    pub limit: Option<usize>,
}

impl Query {
    /// Creates a new query that matches every document.
    pub fn new() -> Self {
        Query::default()
    }

    /// Creates a new query builder for fluent construction.
    pub fn builder() -> QueryBuilder {
        QueryBuilder::new()
    }

    /// Checks the filter, projection and sort keys.
    pub fn validate(&self) -> DocumentStoreResult<()> {
        self.filter.validate()?;
        self.sort
            .iter()
            .try_for_each(|sort| validate_field_path(&sort.field))?;

        if let Some(projection) = &self.projection {
            projection.validate()?;
        }

        Ok(())
    }
}

impl From<Expr> for Query {
    fn from(filter: Expr) -> Self {
        Query { filter, ..Query::default() }
    }
}

/// Helper struct for constructing filter expressions.
///
/// All methods accept field names and values as `Into<String>` and `Into<Bson>` for ergonomics.
///
/// # Example
///
/// ```ignore
/// use docshim::query::Filter;
///
/// let expr = Filter::eq("city", "New York")
///     .and(Filter::gt("age", 18));
/// ```
pub struct Filter;

impl Filter {
    /// A filter matching every document.
    pub fn all() -> Expr {
        Expr::And(Vec::new())
    }

    /// Creates an equality filter expression.
    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Eq, value.into())
    }

    /// Creates a not-equal filter expression.
    pub fn ne(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Ne, value.into())
    }

    /// Creates a greater-than filter expression.
    pub fn gt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gt, value.into())
    }

    /// Creates a greater-than-or-equal filter expression.
    pub fn gte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gte, value.into())
    }

    /// Creates a less-than filter expression.
    pub fn lt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lt, value.into())
    }

    /// Creates a less-than-or-equal filter expression.
    pub fn lte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lte, value.into())
    }

    /// Matches documents where the string field starts with the specified value.
    pub fn starts_with(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::StartsWith, value.into())
    }

    /// Matches documents where the string field ends with the specified value.
    pub fn ends_with(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::EndsWith, value.into())
    }

    /// Matches documents where the field (string or array) contains the specified value.
    pub fn contains(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Contains, value.into())
    }

    /// Matches documents where the field (string or array) does not contain the specified value.
    pub fn not_contains(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::NotContains, value.into())
    }

    /// Matches documents where the field exists.
    pub fn exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), true)
    }

    /// Matches documents where the field does not exist.
    pub fn not_exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), false)
    }

    /// Combines multiple expressions such that all must match.
    pub fn and(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::And(exprs.into_iter().collect())
    }

    /// Combines multiple expressions such that any can match.
    pub fn or(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::Or(exprs.into_iter().collect())
    }

    /// Matches documents where the field, or any of its elements, equals one of the values.
    pub fn any_of(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::AnyOf, value.into())
    }

    /// Matches documents where neither the field nor any of its elements equals one of the values.
    pub fn none_of(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::NoneOf, value.into())
    }

    /// Matches documents whose array field contains every one of the values.
    pub fn all_of(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::All, value.into())
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    query: Query,
}

impl QueryBuilder {
    /// Creates a new query builder.
    pub fn new() -> Self {
        QueryBuilder { query: Query::default() }
    }

    /// Sets the filter expression for this query.
    pub fn filter(mut self, filter: Expr) -> Self {
        self.query.filter = filter;
        self
    }

    /// Restricts the fields of every returned document.
    pub fn projection(mut self, projection: Projection) -> Self {
        self.query.projection = Some(projection);
        self
    }

    /// Appends a sort key; earlier keys take precedence.
    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.query.sort.push(Sort { field: field.into(), direction });
        self
    }

    /// Sets the number of documents to skip.
    pub fn offset(mut self, offset: usize) -> Self {
        self.query.offset = Some(offset);
        self
    }

    /// Sets the maximum number of documents to return.
    pub fn limit(mut self, limit: usize) -> Self {
        self.query.limit = Some(limit);
        self
    }

    /// Builds and returns the final query.
    pub fn build(self) -> Query {
        self.query
    }
}

pub trait QueryVisitor {
    type Output;
    type Error: Into<DocumentStoreError>;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error>;
    fn visit_exists(
        &mut self,
        field: &str,
        should_exist: bool,
    ) -> Result<Self::Output, Self::Error>;
    fn visit_field(
        &mut self,
        field: &str,
        op: &FieldOp,
        value: &Bson,
    ) -> Result<Self::Output, Self::Error>;

    fn visit_expr(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        match expr {
            Expr::And(exprs) => self.visit_and(exprs),
            Expr::Or(exprs) => self.visit_or(exprs),
            Expr::Not(expr) => self.visit_not(expr),
            Expr::Exists(field, should_exist) => self.visit_exists(field, *should_exist),
            Expr::Field { field, op, value } => self.visit_field(field, op, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn parses_implicit_equality_and_operators() {
        let expr = Expr::try_from(&doc! { "city": "New York", "age": { "$gt": 30, "$lte": 40 } }).unwrap();

        assert_eq!(
            expr,
            Filter::and([
                Filter::eq("city", "New York"),
                Filter::and([Filter::gt("age", 30), Filter::lte("age", 40)]),
            ]),
        );
    }

    #[test]
    fn parses_logical_operators() {
        let expr = Expr::try_from(&doc! { "$or": [{ "name": "Bob" }, { "age": { "$lt": 30 } }] }).unwrap();

        assert_eq!(expr, Filter::or([Filter::eq("name", "Bob"), Filter::lt("age", 30)]));
    }

    #[test]
    fn parses_array_operators() {
        let expr = Expr::try_from(&doc! { "interests": { "$all": ["reading", "hiking"] } }).unwrap();

        assert_eq!(expr, Filter::all_of("interests", vec!["reading", "hiking"]));
    }

    #[test]
    fn rejects_unknown_operators() {
        assert!(matches!(
            Expr::try_from(&doc! { "age": { "$near": 3 } }),
            Err(DocumentStoreError::Validation(_)),
        ));
        assert!(Expr::try_from(&doc! { "$where": "this.age > 3" }).is_err());
        assert!(Expr::try_from(&doc! { "age": { "$in": 3 } }).is_err());
    }

    #[test]
    fn empty_document_matches_everything() {
        assert!(Expr::try_from(&doc! {}).unwrap().is_match_all());
    }

    #[test]
    fn builder_accumulates_sort_keys() {
        let query = Query::builder()
            .filter(Filter::exists("name"))
            .sort("age", SortDirection::Desc)
            .sort("name", SortDirection::Asc)
            .limit(2)
            .build();

        assert_eq!(query.sort, vec![Sort::desc("age"), Sort::asc("name")]);
        assert_eq!(query.limit, Some(2));
        assert!(query.validate().is_ok());
    }
}
