//! Aggregation value expressions.
//!
//! An [`Expression`] computes a [`Bson`] value from the document flowing through a
//! pipeline stage. Field references read from the current document (`$orders.qty`),
//! variables read from bindings introduced by `$filter` or the implicit `$$ROOT`.
//!
//! Expressions can be built with the constructor functions or parsed from MongoDB
//! expression syntax with `Expression::try_from(&bson)`.

use bson::{Bson, Document};

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// Name of the variable bound to the whole input document.
pub const ROOT_VARIABLE: &str = "ROOT";

/// Comparison operators usable inside expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CompareOp {
    /// The MongoDB operator name.
    pub fn operator(&self) -> &'static str {
        match self {
            CompareOp::Eq => "$eq",
            CompareOp::Ne => "$ne",
            CompareOp::Gt => "$gt",
            CompareOp::Gte => "$gte",
            CompareOp::Lt => "$lt",
            CompareOp::Lte => "$lte",
        }
    }

    fn from_operator(operator: &str) -> Option<Self> {
        Some(match operator {
            "$eq" => CompareOp::Eq,
            "$ne" => CompareOp::Ne,
            "$gt" => CompareOp::Gt,
            "$gte" => CompareOp::Gte,
            "$lt" => CompareOp::Lt,
            "$lte" => CompareOp::Lte,
            _ => return None,
        })
    }
}

/// A value expression evaluated against a document.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// A constant value.
    Literal(Bson),
    /// A dotted path into the current document.
    Field(String),
    /// A bound variable, optionally followed by a dotted path into it.
    Variable {
        name: String,
        path: Option<String>,
    },
    /// A document whose fields are computed.
    Object(Vec<(String, Expression)>),
    /// An array whose elements are computed.
    Array(Vec<Expression>),
    Add(Vec<Expression>),
    Subtract(Box<Expression>, Box<Expression>),
    Multiply(Vec<Expression>),
    Divide(Box<Expression>, Box<Expression>),
    Compare(CompareOp, Box<Expression>, Box<Expression>),
    And(Vec<Expression>),
    Or(Vec<Expression>),
    Not(Box<Expression>),
    /// Length of an array.
    Size(Box<Expression>),
    /// Keeps the elements of `input` for which `cond` is truthy, with each element bound to `var`.
    Filter {
        input: Box<Expression>,
        var: String,
        cond: Box<Expression>,
    },
}

impl Expression {
    pub fn literal(value: impl Into<Bson>) -> Self {
        Expression::Literal(value.into())
    }

    /// A reference to a field of the current document, without the leading `$`.
    pub fn field(path: impl Into<String>) -> Self {
        Expression::Field(path.into())
    }

    /// A reference to a variable (`name`) or a path inside it (`name.path`).
    pub fn var(reference: impl AsRef<str>) -> Self {
        match reference.as_ref().split_once('.') {
            Some((name, path)) => Expression::Variable { name: name.to_string(), path: Some(path.to_string()) },
            None => Expression::Variable { name: reference.as_ref().to_string(), path: None },
        }
    }

    pub fn add(operands: impl IntoIterator<Item = Expression>) -> Self {
        Expression::Add(operands.into_iter().collect())
    }

    pub fn subtract(left: Expression, right: Expression) -> Self {
        Expression::Subtract(Box::new(left), Box::new(right))
    }

    pub fn multiply(operands: impl IntoIterator<Item = Expression>) -> Self {
        Expression::Multiply(operands.into_iter().collect())
    }

    pub fn divide(left: Expression, right: Expression) -> Self {
        Expression::Divide(Box::new(left), Box::new(right))
    }

    pub fn compare(op: CompareOp, left: Expression, right: Expression) -> Self {
        Expression::Compare(op, Box::new(left), Box::new(right))
    }

    pub fn gt(left: Expression, right: Expression) -> Self {
        Expression::compare(CompareOp::Gt, left, right)
    }

    pub fn size(input: Expression) -> Self {
        Expression::Size(Box::new(input))
    }

    /// Keeps the elements of `input` matching `cond`; `var` names the element inside `cond`.
    pub fn filter(input: Expression, var: impl Into<String>, cond: Expression) -> Self {
        Expression::Filter { input: Box::new(input), var: var.into(), cond: Box::new(cond) }
    }

    /// Checks paths, variable names and operator arity.
    pub fn validate(&self) -> DocumentStoreResult<()> {
        match self {
            Expression::Literal(_) => Ok(()),
            Expression::Field(path) => validate_path(path),
            Expression::Variable { name, path } => {
                validate_variable_name(name)?;
                path.as_deref().map_or(Ok(()), validate_path)
            }
            Expression::Object(fields) => fields.iter().try_for_each(|(name, value)| {
                if name.is_empty() || name.starts_with('$') || name.contains('.') {
                    return Err(DocumentStoreError::validation(format!("invalid computed field name '{name}'")));
                }
                value.validate()
            }),
            Expression::Array(items) | Expression::And(items) | Expression::Or(items) => {
                items.iter().try_for_each(Expression::validate)
            }
            Expression::Add(operands) | Expression::Multiply(operands) => {
                if operands.is_empty() {
                    return Err(DocumentStoreError::validation("arithmetic expressions need at least one operand"));
                }
                operands.iter().try_for_each(Expression::validate)
            }
            Expression::Subtract(left, right)
            | Expression::Divide(left, right)
            | Expression::Compare(_, left, right) => {
                left.validate()?;
                right.validate()
            }
            Expression::Not(inner) | Expression::Size(inner) => inner.validate(),
            Expression::Filter { input, var, cond } => {
                validate_variable_name(var)?;
                input.validate()?;
                cond.validate()
            }
        }
    }
}

fn validate_path(path: &str) -> DocumentStoreResult<()> {
    if path.is_empty() || path.starts_with('$') || path.split('.').any(str::is_empty) {
        return Err(DocumentStoreError::validation(format!("invalid field path '{path}'")));
    }

    Ok(())
}

fn validate_variable_name(name: &str) -> DocumentStoreResult<()> {
    if name.is_empty() || name.starts_with('$') || name.contains('.') {
        return Err(DocumentStoreError::validation(format!("invalid variable name '{name}'")));
    }

    Ok(())
}

impl From<Bson> for Expression {
    fn from(value: Bson) -> Self {
        Expression::Literal(value)
    }
}

/// Parses MongoDB expression syntax.
///
/// `"$a.b"` is a field path, `"$$name.path"` a variable, a single-key document whose
/// key starts with `$` an operator, any other document an object expression, and every
/// other value a literal.
impl TryFrom<&Bson> for Expression {
    type Error = DocumentStoreError;

    fn try_from(value: &Bson) -> Result<Self, Self::Error> {
        let expression = match value {
            Bson::String(reference) if reference.starts_with("$$") => Expression::var(&reference[2..]),
            Bson::String(reference) if reference.starts_with('$') => Expression::field(&reference[1..]),
            Bson::Array(items) => Expression::Array(
                items
                    .iter()
                    .map(Expression::try_from)
                    .collect::<DocumentStoreResult<_>>()?,
            ),
            Bson::Document(document) => match document.keys().next() {
                Some(key) if key.starts_with('$') => parse_operator(document)?,
                _ => Expression::Object(
                    document
                        .iter()
                        .map(|(name, value)| Ok((name.clone(), Expression::try_from(value)?)))
                        .collect::<DocumentStoreResult<_>>()?,
                ),
            },
            other => Expression::Literal(other.clone()),
        };

        expression.validate()?;
        Ok(expression)
    }
}

fn parse_operator(document: &Document) -> DocumentStoreResult<Expression> {
    if document.len() != 1 {
        return Err(DocumentStoreError::validation("an operator expression must have exactly one key"));
    }

    let (operator, operand) = match document.iter().next() {
        Some(entry) => entry,
        None => return Err(DocumentStoreError::validation("empty operator expression")),
    };

    if let Some(op) = CompareOp::from_operator(operator) {
        let [left, right] = parse_fixed_args::<2>(operator, operand)?;
        return Ok(Expression::compare(op, left, right));
    }

    Ok(match operator.as_str() {
        "$literal" => Expression::Literal(operand.clone()),
        "$add" => Expression::Add(parse_args(operand)?),
        "$multiply" => Expression::Multiply(parse_args(operand)?),
        "$and" => Expression::And(parse_args(operand)?),
        "$or" => Expression::Or(parse_args(operand)?),
        "$subtract" => {
            let [left, right] = parse_fixed_args::<2>(operator, operand)?;
            Expression::subtract(left, right)
        }
        "$divide" => {
            let [left, right] = parse_fixed_args::<2>(operator, operand)?;
            Expression::divide(left, right)
        }
        "$not" => {
            let [inner] = parse_fixed_args::<1>(operator, operand)?;
            Expression::Not(Box::new(inner))
        }
        "$size" => {
            let [inner] = parse_fixed_args::<1>(operator, operand)?;
            Expression::size(inner)
        }
        "$filter" => {
            let spec = operand
                .as_document()
                .ok_or_else(|| DocumentStoreError::validation("$filter requires a document"))?;
            let input = spec
                .get("input")
                .ok_or_else(|| DocumentStoreError::validation("$filter requires 'input'"))?;
            let cond = spec
                .get("cond")
                .ok_or_else(|| DocumentStoreError::validation("$filter requires 'cond'"))?;
            let var = match spec.get("as") {
                Some(Bson::String(name)) => name.clone(),
                Some(_) => return Err(DocumentStoreError::validation("$filter 'as' must be a string")),
                None => "this".to_string(),
            };

            Expression::filter(Expression::try_from(input)?, var, Expression::try_from(cond)?)
        }
        other => {
            return Err(DocumentStoreError::validation(format!("unknown expression operator {other}")));
        }
    })
}

fn parse_args(operand: &Bson) -> DocumentStoreResult<Vec<Expression>> {
    match operand {
        Bson::Array(items) => items.iter().map(Expression::try_from).collect(),
        single => Ok(vec![Expression::try_from(single)?]),
    }
}

fn parse_fixed_args<const N: usize>(operator: &str, operand: &Bson) -> DocumentStoreResult<[Expression; N]> {
    parse_args(operand)?
        .try_into()
        .map_err(|args: Vec<Expression>| {
            DocumentStoreError::validation(format!("{operator} takes {N} argument(s), got {}", args.len()))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{bson, doc};

    #[test]
    fn parses_field_and_variable_references() {
        assert_eq!(Expression::try_from(&bson!("$orders.qty")).unwrap(), Expression::field("orders.qty"));
        assert_eq!(
            Expression::try_from(&bson!("$$order.qty")).unwrap(),
            Expression::Variable { name: "order".into(), path: Some("qty".into()) },
        );
    }

    #[test]
    fn parses_filter_operator() {
        let parsed = Expression::try_from(&Bson::Document(doc! {
            "$filter": {
                "input": "$orders",
                "as": "order",
                "cond": { "$gt": ["$$order.qty", 1] },
            }
        }))
        .unwrap();

        assert_eq!(
            parsed,
            Expression::filter(
                Expression::field("orders"),
                "order",
                Expression::gt(Expression::var("order.qty"), Expression::literal(1)),
            ),
        );
    }

    #[test]
    fn rejects_bad_arity_and_unknown_operators() {
        assert!(Expression::try_from(&Bson::Document(doc! { "$subtract": [1] })).is_err());
        assert!(Expression::try_from(&Bson::Document(doc! { "$concat": ["a", "b"] })).is_err());
        assert!(Expression::try_from(&bson!("$")).is_err());
    }
}
