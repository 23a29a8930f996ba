//! In-memory aggregation pipeline execution.
//!
//! Stages run eagerly, one after another, over owned copies of the collection's
//! documents. Any stage error aborts the whole pipeline.

use bson::{Bson, Document};
use std::collections::HashMap;

use docshim_core::{
    document::{ID_FIELD, lookup_path, remove_path, resolve_path, set_path},
    error::DocumentStoreResult,
    expression::Expression,
    pipeline::{Accumulator, Pipeline, PipelineStage},
    projection::{Projection, ProjectionField},
    query::{Sort, SortDirection},
};

use crate::{
    evaluator::{DocumentEvaluator, compare_values, values_equal},
    expression::ExpressionEvaluator,
    numeric::Number,
};

/// Runs pipelines with read access to every collection of the store, which `$lookup`
/// needs to reach foreign collections.
pub(crate) struct PipelineExecutor<'a> {
    collections: &'a HashMap<String, Vec<Document>>,
}

impl<'a> PipelineExecutor<'a> {
    pub fn new(collections: &'a HashMap<String, Vec<Document>>) -> Self {
        Self { collections }
    }

    pub fn run(&self, pipeline: &Pipeline, input: Vec<Document>) -> DocumentStoreResult<Vec<Document>> {
        pipeline
            .stages()
            .iter()
            .try_fold(input, |documents, stage| self.run_stage(stage, documents))
    }

    fn run_stage(&self, stage: &PipelineStage, documents: Vec<Document>) -> DocumentStoreResult<Vec<Document>> {
        match stage {
            PipelineStage::Match(filter) => DocumentEvaluator::filter_documents(&documents, filter),
            PipelineStage::Group { key, accumulators } => group(documents, key, accumulators),
            PipelineStage::Sort(keys) => {
                let mut documents = documents;
                sort_documents(&mut documents, keys);
                Ok(documents)
            }
            PipelineStage::Unwind { path, preserve_null_and_empty } => unwind(documents, path, *preserve_null_and_empty),
            PipelineStage::Project(projection) => documents
                .iter()
                .map(|document| project(document, projection))
                .collect(),
            PipelineStage::Lookup { from, local_field, foreign_field, as_field } => {
                let foreign = self
                    .collections
                    .get(from)
                    .map(Vec::as_slice)
                    .unwrap_or_default();

                documents
                    .into_iter()
                    .map(|document| lookup(document, foreign, local_field, foreign_field, as_field))
                    .collect()
            }
            PipelineStage::Limit(n) => Ok(documents.into_iter().take(*n).collect()),
            PipelineStage::Skip(n) => Ok(documents.into_iter().skip(*n).collect()),
        }
    }
}

/// Stable multi-key sort under the total value order; missing fields sort as null.
pub(crate) fn sort_documents(documents: &mut [Document], keys: &[Sort]) {
    documents.sort_by(|a, b| {
        keys.iter()
            .map(|key| {
                let ordering = compare_values(
                    resolve_path(a, &key.field).as_ref(),
                    resolve_path(b, &key.field).as_ref(),
                );

                match key.direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                }
            })
            .find(|ordering| ordering.is_ne())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// Applies a projection to one document.
pub(crate) fn project(document: &Document, projection: &Projection) -> DocumentStoreResult<Document> {
    if !projection.is_inclusive() {
        let mut projected = document.clone();

        for (path, _) in projection.fields() {
            remove_path(&mut projected, path);
        }

        return Ok(projected);
    }

    let included = projection
        .fields()
        .iter()
        .filter(|(name, field)| matches!(field, ProjectionField::Include) && name != ID_FIELD)
        .map(|(name, _)| name.as_str())
        .collect::<Vec<_>>();

    let mut projected = Document::new();

    if !projection.excludes_id() {
        if let Some(id) = document.get(ID_FIELD) {
            projected.insert(ID_FIELD, id.clone());
        }
    }

    for (key, value) in include_fields(document, &included) {
        projected.insert(key, value);
    }

    let mut evaluator = ExpressionEvaluator::new(document);

    for (name, field) in projection.fields() {
        if let ProjectionField::Computed(expression) = field {
            if let Some(value) = evaluator.evaluate(expression)? {
                set_path(&mut projected, name, value)?;
            }
        }
    }

    Ok(projected)
}

/// Copies the included paths, keeping the document's own field order. Dotted paths
/// descend into embedded documents and into every document element of an array.
fn include_fields(document: &Document, paths: &[&str]) -> Document {
    let mut result = Document::new();

    for (key, value) in document {
        if key == ID_FIELD {
            continue;
        }

        if paths.iter().any(|path| *path == key) {
            result.insert(key.clone(), value.clone());
            continue;
        }

        let nested = paths
            .iter()
            .filter_map(|path| path.strip_prefix(key.as_str())?.strip_prefix('.'))
            .collect::<Vec<_>>();

        if nested.is_empty() {
            continue;
        }

        match value {
            Bson::Document(inner) => {
                result.insert(key.clone(), include_fields(inner, &nested));
            }
            Bson::Array(items) => {
                let projected = items
                    .iter()
                    .filter_map(|item| match item {
                        Bson::Document(inner) => Some(Bson::Document(include_fields(inner, &nested))),
                        _ => None,
                    })
                    .collect::<Vec<_>>();

                result.insert(key.clone(), projected);
            }
            _ => {}
        }
    }

    result
}

fn group(
    documents: Vec<Document>,
    key: &Expression,
    accumulators: &[(String, Accumulator)],
) -> DocumentStoreResult<Vec<Document>> {
    let mut partitions: Vec<(Bson, Vec<Document>)> = Vec::new();

    for document in documents {
        let group_key = ExpressionEvaluator::new(&document)
            .evaluate(key)?
            .unwrap_or(Bson::Null);

        match partitions
            .iter_mut()
            .find(|(existing, _)| values_equal(existing, &group_key))
        {
            Some((_, members)) => members.push(document),
            None => partitions.push((group_key, vec![document])),
        }
    }

    partitions
        .into_iter()
        .map(|(group_key, members)| {
            let mut output = Document::new();
            output.insert(ID_FIELD, group_key);

            for (name, accumulator) in accumulators {
                output.insert(name.clone(), accumulate(accumulator, &members)?);
            }

            Ok(output)
        })
        .collect()
}

fn accumulate(accumulator: &Accumulator, members: &[Document]) -> DocumentStoreResult<Bson> {
    let expression = match accumulator.expression() {
        Some(expression) => expression,
        None => return Ok(count_value(members.len())),
    };

    let values = members
        .iter()
        .map(|member| ExpressionEvaluator::new(member).evaluate(expression))
        .collect::<DocumentStoreResult<Vec<_>>>()?;

    Ok(match accumulator {
        Accumulator::Count => count_value(members.len()),
        Accumulator::Sum(_) => values
            .iter()
            .flatten()
            .filter_map(Number::from_bson)
            .fold(Number::Int32(0), Number::add)
            .into(),
        Accumulator::Avg(_) => {
            let numbers = values
                .iter()
                .flatten()
                .filter_map(Number::from_bson)
                .map(Number::as_f64)
                .collect::<Vec<_>>();

            if numbers.is_empty() {
                Bson::Null
            } else {
                Bson::Double(numbers.iter().sum::<f64>() / numbers.len() as f64)
            }
        }
        Accumulator::First(_) => values.into_iter().next().flatten().unwrap_or(Bson::Null),
        Accumulator::Last(_) => values.into_iter().last().flatten().unwrap_or(Bson::Null),
        Accumulator::Push(_) => Bson::Array(values.into_iter().flatten().collect()),
        Accumulator::Min(_) | Accumulator::Max(_) => {
            let present = values
                .iter()
                .flatten()
                .filter(|value| !matches!(value, Bson::Null));

            let chosen = match accumulator {
                Accumulator::Min(_) => present.min_by(|a, b| compare_values(Some(*a), Some(*b))),
                _ => present.max_by(|a, b| compare_values(Some(*a), Some(*b))),
            };

            chosen.cloned().unwrap_or(Bson::Null)
        }
    })
}

fn count_value(count: usize) -> Bson {
    match i32::try_from(count) {
        Ok(count) => Bson::Int32(count),
        Err(_) => Bson::Int64(i64::try_from(count).unwrap_or(i64::MAX)),
    }
}

fn unwind(documents: Vec<Document>, path: &str, preserve_null_and_empty: bool) -> DocumentStoreResult<Vec<Document>> {
    let mut output = Vec::with_capacity(documents.len());

    for document in documents {
        match lookup_path(&document, path) {
            Some(Bson::Array(items)) if !items.is_empty() => {
                for item in items {
                    let mut unwound = document.clone();
                    set_path(&mut unwound, path, item.clone())?;
                    output.push(unwound);
                }
            }
            Some(Bson::Array(_)) => {
                if preserve_null_and_empty {
                    let mut preserved = document.clone();
                    remove_path(&mut preserved, path);
                    output.push(preserved);
                }
            }
            None | Some(Bson::Null) => {
                if preserve_null_and_empty {
                    output.push(document);
                }
            }
            Some(_) => output.push(document),
        }
    }

    Ok(output)
}

fn lookup(
    mut document: Document,
    foreign: &[Document],
    local_field: &str,
    foreign_field: &str,
    as_field: &str,
) -> DocumentStoreResult<Document> {
    let local = resolve_path(&document, local_field);
    let keys = match &local {
        Some(Bson::Array(items)) if !items.is_empty() => items.iter().collect::<Vec<_>>(),
        Some(value) => vec![value],
        None => vec![&Bson::Null],
    };

    let joined = foreign
        .iter()
        .filter(|candidate| {
            let evaluator = DocumentEvaluator::new(candidate);
            keys.iter().any(|key| evaluator.field_equals(foreign_field, key))
        })
        .map(|candidate| Bson::Document(candidate.clone()))
        .collect::<Vec<_>>();

    set_path(&mut document, as_field, Bson::Array(joined))?;
    Ok(document)
}
