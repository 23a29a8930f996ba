//! Evaluation of aggregation expressions against a document.

use bson::{Bson, Document};

use docshim_core::{
    document::{resolve_path, resolve_value_path},
    error::{DocumentStoreError, DocumentStoreResult},
    expression::{CompareOp, Expression, ROOT_VARIABLE},
};

use crate::{evaluator::compare_values, numeric::Number};

/// Evaluates expressions against one input document.
///
/// `Ok(None)` means the expression resolved to a missing value, which callers treat
/// differently from an explicit null (a missing computed field is omitted).
pub(crate) struct ExpressionEvaluator<'a> {
    root: &'a Document,
    variables: Vec<(String, Bson)>,
}

impl<'a> ExpressionEvaluator<'a> {
    pub fn new(root: &'a Document) -> Self {
        Self { root, variables: Vec::new() }
    }

    pub fn evaluate(&mut self, expression: &Expression) -> DocumentStoreResult<Option<Bson>> {
        Ok(match expression {
            Expression::Literal(value) => Some(value.clone()),
            Expression::Field(path) => resolve_path(self.root, path),
            Expression::Variable { name, path } => {
                let value = self.variable(name)?;

                match path {
                    None => Some(value),
                    Some(path) => resolve_value_path(&value, path),
                }
            }
            Expression::Object(fields) => {
                let mut document = Document::new();

                for (name, field) in fields {
                    if let Some(value) = self.evaluate(field)? {
                        document.insert(name.clone(), value);
                    }
                }

                Some(Bson::Document(document))
            }
            Expression::Array(items) => Some(Bson::Array(
                items
                    .iter()
                    .map(|item| Ok(self.evaluate(item)?.unwrap_or(Bson::Null)))
                    .collect::<DocumentStoreResult<_>>()?,
            )),
            Expression::Add(operands) => self.fold_numbers("$add", operands, Number::add)?,
            Expression::Multiply(operands) => self.fold_numbers("$multiply", operands, Number::multiply)?,
            Expression::Subtract(left, right) => {
                let (left, right) = (self.evaluate(left)?, self.evaluate(right)?);

                match (numeric_operand("$subtract", left)?, numeric_operand("$subtract", right)?) {
                    (Some(a), Some(b)) => Some(a.subtract(b).into()),
                    _ => Some(Bson::Null),
                }
            }
            Expression::Divide(left, right) => {
                let (left, right) = (self.evaluate(left)?, self.evaluate(right)?);

                match (numeric_operand("$divide", left)?, numeric_operand("$divide", right)?) {
                    (Some(_), Some(b)) if b.as_f64() == 0.0 => {
                        return Err(DocumentStoreError::validation("$divide by zero"));
                    }
                    (Some(a), Some(b)) => Some(Bson::Double(a.as_f64() / b.as_f64())),
                    _ => Some(Bson::Null),
                }
            }
            Expression::Compare(op, left, right) => {
                let (left, right) = (self.evaluate(left)?, self.evaluate(right)?);
                let ordering = compare_values(left.as_ref(), right.as_ref());

                Some(Bson::Boolean(match op {
                    CompareOp::Eq => ordering.is_eq(),
                    CompareOp::Ne => ordering.is_ne(),
                    CompareOp::Gt => ordering.is_gt(),
                    CompareOp::Gte => ordering.is_ge(),
                    CompareOp::Lt => ordering.is_lt(),
                    CompareOp::Lte => ordering.is_le(),
                }))
            }
            Expression::And(operands) => {
                for operand in operands {
                    if !is_truthy(self.evaluate(operand)?.as_ref()) {
                        return Ok(Some(Bson::Boolean(false)));
                    }
                }
                Some(Bson::Boolean(true))
            }
            Expression::Or(operands) => {
                for operand in operands {
                    if is_truthy(self.evaluate(operand)?.as_ref()) {
                        return Ok(Some(Bson::Boolean(true)));
                    }
                }
                Some(Bson::Boolean(false))
            }
            Expression::Not(operand) => Some(Bson::Boolean(!is_truthy(self.evaluate(operand)?.as_ref()))),
            Expression::Size(operand) => match self.evaluate(operand)? {
                Some(Bson::Array(items)) => Some(Bson::Int32(i32::try_from(items.len()).unwrap_or(i32::MAX))),
                other => {
                    return Err(DocumentStoreError::validation(format!(
                        "$size requires an array, found {}",
                        describe(other.as_ref())
                    )));
                }
            },
            Expression::Filter { input, var, cond } => match self.evaluate(input)? {
                None | Some(Bson::Null) => Some(Bson::Null),
                Some(Bson::Array(items)) => {
                    let mut kept = Vec::with_capacity(items.len());

                    for item in items {
                        self.variables.push((var.clone(), item));
                        let keep = self.evaluate(cond);
                        let (_, item) = self
                            .variables
                            .pop()
                            .ok_or_else(|| DocumentStoreError::Backend("variable scope underflow".to_string()))?;

                        if is_truthy(keep?.as_ref()) {
                            kept.push(item);
                        }
                    }

                    Some(Bson::Array(kept))
                }
                Some(other) => {
                    return Err(DocumentStoreError::validation(format!(
                        "$filter input must be an array, found {}",
                        describe(Some(&other))
                    )));
                }
            },
        })
    }

    fn variable(&self, name: &str) -> DocumentStoreResult<Bson> {
        if name == ROOT_VARIABLE {
            return Ok(Bson::Document(self.root.clone()));
        }

        self.variables
            .iter()
            .rev()
            .find(|(bound, _)| bound == name)
            .map(|(_, value)| value.clone())
            .ok_or_else(|| DocumentStoreError::validation(format!("undefined variable $${name}")))
    }

    fn fold_numbers(
        &mut self,
        operator: &str,
        operands: &[Expression],
        combine: fn(Number, Number) -> Number,
    ) -> DocumentStoreResult<Option<Bson>> {
        let mut total: Option<Number> = None;
        let mut saw_null = false;

        for operand in operands {
            let value = self.evaluate(operand)?;

            match numeric_operand(operator, value)? {
                Some(number) => total = Some(total.map_or(number, |acc| combine(acc, number))),
                None => saw_null = true,
            }
        }

        Ok(match total {
            Some(total) if !saw_null => Some(total.into()),
            _ => Some(Bson::Null),
        })
    }
}

/// A numeric operand, `None` for null or missing, or an error for any other type.
fn numeric_operand(operator: &str, value: Option<Bson>) -> DocumentStoreResult<Option<Number>> {
    match value {
        None | Some(Bson::Null) => Ok(None),
        Some(value) => Number::from_bson(&value).map(Some).ok_or_else(|| {
            DocumentStoreError::validation(format!("{operator} only supports numeric types, found {}", describe(Some(&value))))
        }),
    }
}

/// Truthiness of an expression result: null, missing, `false` and zero are false.
pub(crate) fn is_truthy(value: Option<&Bson>) -> bool {
    match value {
        None | Some(Bson::Null) | Some(Bson::Undefined) => false,
        Some(Bson::Boolean(b)) => *b,
        Some(other) => Number::from_bson(other).is_none_or(|n| n.as_f64() != 0.0),
    }
}

fn describe(value: Option<&Bson>) -> String {
    match value {
        None => "missing".to_string(),
        Some(value) => format!("{:?}", value.element_type()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn evaluate(document: &Document, expression: &Expression) -> DocumentStoreResult<Option<Bson>> {
        ExpressionEvaluator::new(document).evaluate(expression)
    }

    #[test]
    fn multiplies_unwound_order_fields() {
        let order = doc! { "orders": { "item": "Mouse", "qty": 2, "price": 25 } };
        let total = Expression::multiply([Expression::field("orders.qty"), Expression::field("orders.price")]);

        assert_eq!(evaluate(&order, &total).unwrap(), Some(Bson::Int32(50)));
    }

    #[test]
    fn multiply_rejects_strings() {
        let document = doc! { "qty": "two", "price": 25 };
        let total = Expression::multiply([Expression::field("qty"), Expression::field("price")]);

        assert!(matches!(evaluate(&document, &total), Err(DocumentStoreError::Validation(_))));
    }

    #[test]
    fn filter_binds_each_element() {
        let user = doc! {
            "orders": [
                { "item": "Laptop", "qty": 1 },
                { "item": "Mouse", "qty": 2 },
            ],
        };
        let large = Expression::filter(
            Expression::field("orders"),
            "order",
            Expression::gt(Expression::var("order.qty"), Expression::literal(1)),
        );

        assert_eq!(
            evaluate(&user, &large).unwrap(),
            Some(Bson::Array(vec![Bson::Document(doc! { "item": "Mouse", "qty": 2 })])),
        );
    }

    #[test]
    fn filter_rejects_non_array_input() {
        let user = doc! { "orders": "none" };
        let large = Expression::filter(Expression::field("orders"), "order", Expression::literal(true));

        assert!(evaluate(&user, &large).is_err());
        assert_eq!(evaluate(&doc! {}, &large).unwrap(), Some(Bson::Null));
    }

    #[test]
    fn missing_operands_make_arithmetic_null() {
        let sum = Expression::add([Expression::field("a"), Expression::literal(1)]);

        assert_eq!(evaluate(&doc! {}, &sum).unwrap(), Some(Bson::Null));
        assert_eq!(evaluate(&doc! { "a": 2.5 }, &sum).unwrap(), Some(Bson::Double(3.5)));
    }

    #[test]
    fn undefined_variables_are_rejected() {
        assert!(evaluate(&doc! {}, &Expression::var("order.qty")).is_err());
        assert!(evaluate(&doc! { "a": 1 }, &Expression::var("ROOT.a")).is_ok());
    }
}
