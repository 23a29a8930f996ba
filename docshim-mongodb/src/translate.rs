//! Translation of updates, projections and aggregation pipelines into MongoDB syntax.

use bson::{Bson, Document, doc};

use docshim_core::{
    error::DocumentStoreResult,
    expression::Expression,
    pipeline::{Accumulator, Pipeline, PipelineStage},
    projection::{Projection, ProjectionField},
    query::{Sort, SortDirection},
    update::{Update, UpdateOp},
};

use crate::query::MongoQueryTranslator;

/// Builds an update document, grouping operations under their operator.
pub(crate) fn update_document(update: &Update) -> Document {
    let mut translated = Document::new();

    for (path, op) in update.operations() {
        let value = match op {
            UpdateOp::Set(value)
            | UpdateOp::Inc(value)
            | UpdateOp::AddToSet(value)
            | UpdateOp::Pull(value) => value.clone(),
            UpdateOp::Unset => Bson::String(String::new()),
        };

        match translated.get_mut(op.operator()) {
            Some(Bson::Document(fields)) => {
                fields.insert(path.clone(), value);
            }
            _ => {
                translated.insert(op.operator(), doc! { path.clone(): value });
            }
        }
    }

    translated
}

pub(crate) fn sort_document(keys: &[Sort]) -> Document {
    keys.iter()
        .map(|key| {
            let direction = match key.direction {
                SortDirection::Asc => 1,
                SortDirection::Desc => -1,
            };

            (key.field.clone(), Bson::Int32(direction))
        })
        .collect()
}

pub(crate) fn projection_document(projection: &Projection) -> Document {
    projection
        .fields()
        .iter()
        .map(|(path, field)| {
            let value = match field {
                ProjectionField::Include => Bson::Int32(1),
                ProjectionField::Exclude => Bson::Int32(0),
                ProjectionField::Computed(expression) => expression_value(expression),
            };

            (path.clone(), value)
        })
        .collect()
}

/// Renders an aggregation expression. Literals are always wrapped in `$literal`,
/// so strings starting with `$` and numbers inside projections keep their meaning.
pub(crate) fn expression_value(expression: &Expression) -> Bson {
    fn list(operands: &[Expression]) -> Bson {
        Bson::Array(operands.iter().map(expression_value).collect())
    }

    fn pair(left: &Expression, right: &Expression) -> Bson {
        Bson::Array(vec![expression_value(left), expression_value(right)])
    }

    match expression {
        Expression::Literal(value) => Bson::Document(doc! { "$literal": value.clone() }),
        Expression::Field(path) => Bson::String(format!("${path}")),
        Expression::Variable { name, path: None } => Bson::String(format!("$${name}")),
        Expression::Variable { name, path: Some(path) } => Bson::String(format!("$${name}.{path}")),
        Expression::Object(fields) => Bson::Document(
            fields
                .iter()
                .map(|(name, field)| (name.clone(), expression_value(field)))
                .collect(),
        ),
        Expression::Array(items) => list(items),
        Expression::Add(operands) => Bson::Document(doc! { "$add": list(operands) }),
        Expression::Multiply(operands) => Bson::Document(doc! { "$multiply": list(operands) }),
        Expression::Subtract(left, right) => Bson::Document(doc! { "$subtract": pair(left, right) }),
        Expression::Divide(left, right) => Bson::Document(doc! { "$divide": pair(left, right) }),
        Expression::Compare(op, left, right) => Bson::Document(doc! { op.operator(): pair(left, right) }),
        Expression::And(operands) => Bson::Document(doc! { "$and": list(operands) }),
        Expression::Or(operands) => Bson::Document(doc! { "$or": list(operands) }),
        Expression::Not(operand) => Bson::Document(doc! { "$not": [expression_value(operand)] }),
        Expression::Size(operand) => Bson::Document(doc! { "$size": expression_value(operand) }),
        Expression::Filter { input, var, cond } => Bson::Document(doc! {
            "$filter": {
                "input": expression_value(input),
                "as": var.clone(),
                "cond": expression_value(cond),
            },
        }),
    }
}

fn accumulator_value(accumulator: &Accumulator) -> Bson {
    let (operator, expression) = match accumulator {
        Accumulator::Count => return Bson::Document(doc! { "$sum": 1 }),
        Accumulator::Sum(expression) => ("$sum", expression),
        Accumulator::Avg(expression) => ("$avg", expression),
        Accumulator::First(expression) => ("$first", expression),
        Accumulator::Last(expression) => ("$last", expression),
        Accumulator::Push(expression) => ("$push", expression),
        Accumulator::Min(expression) => ("$min", expression),
        Accumulator::Max(expression) => ("$max", expression),
    };

    Bson::Document(doc! { operator: expression_value(expression) })
}

fn stage_document(stage: &PipelineStage) -> DocumentStoreResult<Document> {
    Ok(match stage {
        PipelineStage::Match(filter) => doc! { "$match": MongoQueryTranslator::translate(filter)? },
        PipelineStage::Group { key, accumulators } => {
            let mut group = doc! { "_id": expression_value(key) };

            for (name, accumulator) in accumulators {
                group.insert(name.clone(), accumulator_value(accumulator));
            }

            doc! { "$group": group }
        }
        PipelineStage::Sort(keys) => doc! { "$sort": sort_document(keys) },
        PipelineStage::Unwind { path, preserve_null_and_empty } => doc! {
            "$unwind": {
                "path": format!("${path}"),
                "preserveNullAndEmptyArrays": *preserve_null_and_empty,
            },
        },
        PipelineStage::Project(projection) => doc! { "$project": projection_document(projection) },
        PipelineStage::Lookup { from, local_field, foreign_field, as_field } => doc! {
            "$lookup": {
                "from": from.clone(),
                "localField": local_field.clone(),
                "foreignField": foreign_field.clone(),
                "as": as_field.clone(),
            },
        },
        PipelineStage::Limit(n) => doc! { "$limit": count(*n) },
        PipelineStage::Skip(n) => doc! { "$skip": count(*n) },
    })
}

fn count(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// Renders every stage of a pipeline.
pub(crate) fn pipeline_documents(pipeline: &Pipeline) -> DocumentStoreResult<Vec<Document>> {
    pipeline
        .stages()
        .iter()
        .map(stage_document)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use docshim_core::query::Filter;

    #[test]
    fn update_groups_operations_by_operator() {
        let update = Update::new()
            .set("address.city", "San Francisco")
            .inc("age", 1)
            .set("name", "Alice")
            .unset("legacy");

        assert_eq!(
            update_document(&update),
            doc! {
                "$set": { "address.city": "San Francisco", "name": "Alice" },
                "$inc": { "age": 1 },
                "$unset": { "legacy": "" },
            },
        );
    }

    #[test]
    fn group_by_city_renders_accumulators() {
        let pipeline = Pipeline::new()
            .stage(PipelineStage::Match(Filter::gte("age", 25)))
            .stage(
                PipelineStage::group(
                    Expression::field("city"),
                    [
                        ("userCount", Accumulator::Count),
                        ("averageAge", Accumulator::Avg(Expression::field("age"))),
                    ],
                )
                .unwrap(),
            )
            .stage(PipelineStage::Sort(vec![Sort::desc("userCount")]));

        assert_eq!(
            pipeline_documents(&pipeline).unwrap(),
            vec![
                doc! { "$match": { "age": { "$gte": 25 } } },
                doc! { "$group": { "_id": "$city", "userCount": { "$sum": 1 }, "averageAge": { "$avg": "$age" } } },
                doc! { "$sort": { "userCount": -1 } },
            ],
        );
    }

    #[test]
    fn literals_are_wrapped() {
        let projection = Projection::new()
            .include("name")
            .computed("label", Expression::literal("$price"))
            .computed("total", Expression::multiply([Expression::field("qty"), Expression::literal(2)]));

        assert_eq!(
            projection_document(&projection),
            doc! {
                "name": 1,
                "label": { "$literal": "$price" },
                "total": { "$multiply": ["$qty", { "$literal": 2 }] },
            },
        );
    }

    #[test]
    fn unwind_and_lookup_use_server_field_names() {
        let pipeline = Pipeline::new()
            .stage(PipelineStage::unwind("$orders", false).unwrap())
            .stage(PipelineStage::lookup("products_inventory", "orders.item", "name", "product").unwrap());

        assert_eq!(
            pipeline_documents(&pipeline).unwrap(),
            vec![
                doc! { "$unwind": { "path": "$orders", "preserveNullAndEmptyArrays": false } },
                doc! {
                    "$lookup": {
                        "from": "products_inventory",
                        "localField": "orders.item",
                        "foreignField": "name",
                        "as": "product",
                    },
                },
            ],
        );
    }
}
